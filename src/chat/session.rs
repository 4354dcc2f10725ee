//! In-memory conversation state keyed by session id.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStage {
    AwaitingFeedback { original_query: String },
    AwaitingTechDetails { original_query: String },
}

#[derive(Debug)]
struct ChatSession {
    stage: ChatStage,
    touched: Instant,
}

/// Keyed by (owner, session id).
#[derive(Debug, Default)]
pub struct ChatSessions {
    inner: Mutex<HashMap<(i32, String), ChatSession>>,
}

impl ChatSessions {
    /// Removes and returns the stage for `session_id` if it belongs to `user_id` and is fresh.
    pub fn take(&self, session_id: &str, user_id: i32) -> Option<ChatStage> {
        let mut sessions = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.touched.elapsed() < SESSION_TTL);
        sessions
            .remove(&(user_id, session_id.to_string()))
            .map(|s| s.stage)
    }

    pub fn put(&self, session_id: &str, user_id: i32, stage: ChatStage) {
        let mut sessions = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(
            (user_id, session_id.to_string()),
            ChatSession {
                stage,
                touched: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
