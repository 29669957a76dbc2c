use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("depth exceeded")] DepthExceeded,
    #[error("internal: {0}")] Internal(#[from] anyhow::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    /// Batch author lookup used by the tree builder.
    async fn users_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<User>>;
}

#[async_trait]
pub trait TopicRepo: Send + Sync {
    async fn create_topic(&self, new: NewTopic) -> RepoResult<Topic>;
    async fn get_topic(&self, id: Id) -> RepoResult<Topic>;
    async fn count_topics(&self) -> RepoResult<i64>;
    /// Offset mode: topics ordered by id descending, skip `offset`, take `limit`.
    async fn list_topics_page(&self, offset: i64, limit: i64) -> RepoResult<Vec<Topic>>;
    /// Cursor mode: topics with `id >= cursor` ordered ascending, take `fetch` rows.
    /// Callers pass `limit + 1` to detect whether a next page exists.
    async fn list_topics_from(&self, cursor: Id, fetch: i64) -> RepoResult<Vec<Topic>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Validates the topic and parent, computes depth, and rejects anything
    /// nesting past `MAX_COMMENT_DEPTH`. The parent must belong to the same
    /// topic as the new comment.
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    /// All comments of a topic in chronological order (ties broken by id).
    async fn comments_for_topic(&self, topic_id: Id) -> RepoResult<Vec<Comment>>;
}

pub trait Repo: UserRepo + TopicRepo + CommentRepo {}

impl<T> Repo for T where T: UserRepo + TopicRepo + CommentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};
    use tracing::warn;

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        topics: HashMap<Id, Topic>,
        comments: HashMap<Id, Comment>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("AGORA_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.email == new.email) {
                return Err(RepoError::Conflict);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                email: new.email,
                username: new.username,
                password_hash: new.password_hash,
                created_at: now,
                updated_at: now,
            };
            s.users.insert(id, user.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.email == email).cloned())
        }

        async fn users_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<User>> {
            let s = self.state.read().unwrap();
            Ok(ids.iter().filter_map(|id| s.users.get(id).cloned()).collect())
        }
    }

    #[async_trait]
    impl TopicRepo for InMemRepo {
        async fn create_topic(&self, new: NewTopic) -> RepoResult<Topic> {
            let mut s = self.state.write().unwrap();
            if !s.users.contains_key(&new.user_id) {
                return Err(RepoError::NotFound);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let topic = Topic {
                id,
                title: new.title,
                content: new.content,
                user_id: new.user_id,
                created_at: now,
                updated_at: now,
            };
            s.topics.insert(id, topic.clone());
            drop(s);
            self.persist();
            Ok(topic)
        }

        async fn get_topic(&self, id: Id) -> RepoResult<Topic> {
            let s = self.state.read().unwrap();
            s.topics.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn count_topics(&self) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.topics.len() as i64)
        }

        async fn list_topics_page(&self, offset: i64, limit: i64) -> RepoResult<Vec<Topic>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.topics.values().cloned().collect();
            v.sort_by(|a, b| b.id.cmp(&a.id)); // newest first
            Ok(v.into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect())
        }

        async fn list_topics_from(&self, cursor: Id, fetch: i64) -> RepoResult<Vec<Topic>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.topics.values().filter(|t| t.id >= cursor).cloned().collect();
            v.sort_by_key(|t| t.id);
            Ok(v.into_iter().take(fetch.max(0) as usize).collect())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            // The write lock serializes the depth check against concurrent
            // replies to the same parent.
            let mut s = self.state.write().unwrap();
            if !s.topics.contains_key(&new.topic_id) {
                return Err(RepoError::NotFound);
            }
            let depth = match new.parent_id {
                Some(pid) => {
                    let parent = s.comments.get(&pid).ok_or(RepoError::NotFound)?;
                    if parent.topic_id != new.topic_id {
                        return Err(RepoError::NotFound);
                    }
                    let d = parent.depth + 1;
                    if d > MAX_COMMENT_DEPTH {
                        return Err(RepoError::DepthExceeded);
                    }
                    d
                }
                None => 0,
            };
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                content: new.content,
                topic_id: new.topic_id,
                user_id: new.user_id,
                parent_id: new.parent_id,
                depth,
                created_at: now,
                updated_at: now,
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn comments_for_topic(&self, topic_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.comments
                .values()
                .filter(|c| c.topic_id == topic_id)
                .cloned()
                .collect();
            // Chronological; ids break timestamp ties at the same tick.
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(v)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    fn db_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(d) if d.is_unique_violation() => RepoError::Conflict,
            _ => RepoError::Internal(e.into()),
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (email, username, password_hash) VALUES ($1,$2,$3) \
                 RETURNING id, email, username, password_hash, created_at, updated_at",
            )
            .bind(&new.email)
            .bind(&new.username)
            .bind(&new.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, email, username, password_hash, created_at, updated_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            sqlx::query_as::<_, User>(
                "SELECT id, email, username, password_hash, created_at, updated_at FROM users WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn users_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<User>> {
            sqlx::query_as::<_, User>(
                "SELECT id, email, username, password_hash, created_at, updated_at FROM users WHERE id = ANY($1)",
            )
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }
    }

    #[async_trait]
    impl TopicRepo for PgRepo {
        async fn create_topic(&self, new: NewTopic) -> RepoResult<Topic> {
            sqlx::query_as::<_, Topic>(
                "INSERT INTO topics (title, content, user_id) VALUES ($1,$2,$3) \
                 RETURNING id, title, content, user_id, created_at, updated_at",
            )
            .bind(&new.title)
            .bind(&new.content)
            .bind(new.user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn get_topic(&self, id: Id) -> RepoResult<Topic> {
            sqlx::query_as::<_, Topic>(
                "SELECT id, title, content, user_id, created_at, updated_at FROM topics WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn count_topics(&self) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM topics")
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn list_topics_page(&self, offset: i64, limit: i64) -> RepoResult<Vec<Topic>> {
            sqlx::query_as::<_, Topic>(
                "SELECT id, title, content, user_id, created_at, updated_at FROM topics \
                 ORDER BY id DESC OFFSET $1 LIMIT $2",
            )
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn list_topics_from(&self, cursor: Id, fetch: i64) -> RepoResult<Vec<Topic>> {
            sqlx::query_as::<_, Topic>(
                "SELECT id, title, content, user_id, created_at, updated_at FROM topics \
                 WHERE id >= $1 ORDER BY id ASC LIMIT $2",
            )
            .bind(cursor)
            .bind(fetch)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await.map_err(db_err)?;

            let topic: Option<(Id,)> = sqlx::query_as("SELECT id FROM topics WHERE id = $1")
                .bind(new.topic_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            if topic.is_none() {
                return Err(RepoError::NotFound);
            }

            let depth = match new.parent_id {
                Some(pid) => {
                    // Row lock so concurrent replies to the same parent cannot
                    // both pass the depth check.
                    let parent: Option<(Id, Id, i32)> = sqlx::query_as(
                        "SELECT id, topic_id, depth FROM comments WHERE id = $1 FOR UPDATE",
                    )
                    .bind(pid)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?;
                    let (_, parent_topic, parent_depth) = parent.ok_or(RepoError::NotFound)?;
                    if parent_topic != new.topic_id {
                        return Err(RepoError::NotFound);
                    }
                    let d = parent_depth + 1;
                    if d > MAX_COMMENT_DEPTH {
                        return Err(RepoError::DepthExceeded);
                    }
                    d
                }
                None => 0,
            };

            let comment = sqlx::query_as::<_, Comment>(
                "INSERT INTO comments (content, topic_id, user_id, parent_id, depth) \
                 VALUES ($1,$2,$3,$4,$5) \
                 RETURNING id, content, topic_id, user_id, parent_id, depth, created_at, updated_at",
            )
            .bind(&new.content)
            .bind(new.topic_id)
            .bind(new.user_id)
            .bind(new.parent_id)
            .bind(depth)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

            tx.commit().await.map_err(db_err)?;
            Ok(comment)
        }

        async fn comments_for_topic(&self, topic_id: Id) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(
                "SELECT id, content, topic_id, user_id, parent_id, depth, created_at, updated_at \
                 FROM comments WHERE topic_id = $1 ORDER BY created_at ASC, id ASC",
            )
            .bind(topic_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }
    }
}
