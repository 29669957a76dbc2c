use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Hard ceiling on comment nesting: 0 = top-level, 1 = reply, 2 = reply-to-reply.
pub const MAX_COMMENT_DEPTH: i32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User shape returned by the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserPublic {
    fn from(u: User) -> Self {
        Self { id: u.id, email: u.email, username: u.username, created_at: u.created_at }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Topic {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTopic {
    pub title: String,
    pub content: String,
    pub user_id: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub content: String,
    pub topic_id: Id,
    pub user_id: Id,
    pub parent_id: Option<Id>,
    pub depth: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub content: String,
    pub topic_id: Id,
    pub user_id: Id,
    pub parent_id: Option<Id>,
}

// ---------------- request bodies ----------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Login is form-encoded; `username` carries the email address.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TopicCreate {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CommentCreate {
    pub content: String,
    pub topic_id: Id,
    pub parent_id: Option<Id>,
}

// ---------------- response assembly ----------------

/// A comment with its resolved author and nested replies.
/// `replies` is always present; empty at the depth ceiling.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentNode {
    pub id: Id,
    pub content: String,
    pub topic_id: Id,
    pub user_id: Id,
    pub parent_id: Option<Id>,
    pub depth: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: UserPublic,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn new(c: Comment, user: UserPublic, replies: Vec<CommentNode>) -> Self {
        Self {
            id: c.id,
            content: c.content,
            topic_id: c.topic_id,
            user_id: c.user_id,
            parent_id: c.parent_id,
            depth: c.depth,
            created_at: c.created_at,
            updated_at: c.updated_at,
            user,
            replies,
        }
    }
}

/// Topic plus author (detail view only) and its full comment tree.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TopicWithComments {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: Option<UserPublic>,
    pub comments: Vec<CommentNode>,
}

impl TopicWithComments {
    pub fn new(t: Topic, user: Option<UserPublic>, comments: Vec<CommentNode>) -> Self {
        Self {
            id: t.id,
            title: t.title,
            content: t.content,
            user_id: t.user_id,
            created_at: t.created_at,
            updated_at: t.updated_at,
            user,
            comments,
        }
    }
}
