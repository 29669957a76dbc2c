use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Sliding-window in-memory write limiter, keyed per user. Process-local.
#[derive(Clone)]
pub struct WriteLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    enabled: bool,
    topic_limit: usize,
    topic_window: Duration,
    comment_limit: usize,
    comment_window: Duration,
}

fn usize_env(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn secs_env(name: &str, default: u64) -> Duration {
    Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default))
}

impl WriteLimiter {
    /// Disabled unless `AGORA_RL_ENABLED` is truthy, so the default behavior
    /// matches an unlimited deployment.
    pub fn from_env() -> Self {
        let enabled = std::env::var("AGORA_RL_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            store: Arc::new(DashMap::new()),
            enabled,
            topic_limit: usize_env("AGORA_RL_TOPIC_LIMIT", 5),
            topic_window: secs_env("AGORA_RL_TOPIC_WINDOW", 300),
            comment_limit: usize_env("AGORA_RL_COMMENT_LIMIT", 20),
            comment_window: secs_env("AGORA_RL_COMMENT_WINDOW", 60),
        }
    }

    #[cfg(test)]
    fn for_test(limit: usize, window: Duration) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            enabled: true,
            topic_limit: limit,
            topic_window: window,
            comment_limit: limit,
            comment_window: window,
        }
    }

    pub fn allow_topic(&self, user_id: i64) -> bool {
        self.check(&format!("topic:{user_id}"), self.topic_limit, self.topic_window)
    }

    pub fn allow_comment(&self, user_id: i64) -> bool {
        self.check(&format!("comment:{user_id}"), self.comment_limit, self.comment_window)
    }

    fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut hits = self.store.entry(key.to_string()).or_default();
        while let Some(front) = hits.front() {
            if now.duration_since(*front) >= window {
                hits.pop_front();
            } else {
                break;
            }
        }
        if hits.len() < limit {
            hits.push_back(now);
            true
        } else {
            false
        }
    }
}
