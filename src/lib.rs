pub mod auth;
pub mod error;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod password;
pub mod rate_limit; // in-memory write rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod tree;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
