//! History store: per-user turn log kept for the life of the process.
//!
//! Turns are only ever appended in (user, assistant) pairs, so every stored
//! log has an even length and alternates roles. Nothing is persisted and
//! nothing expires; entries live until cleared or process exit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::types::Turn;

/// Storage seam for conversation history.
///
/// The orchestrator owns an `Arc<dyn HistoryStore>` so tests can inject
/// their own instance.
pub trait HistoryStore: Send + Sync {
    /// All turns for `user_id`, oldest first. Empty for unknown users.
    fn get(&self, user_id: &str) -> Vec<Turn>;

    /// Append a user turn and an assistant turn as one unit.
    fn append(&self, user_id: &str, user_text: &str, assistant_text: &str);

    /// Drop the user's log. Returns whether one existed.
    fn clear(&self, user_id: &str) -> bool;
}

// ─── InMemoryHistoryStore ───────────────────────────────────────────────────

type TurnLog = Arc<Mutex<Vec<Turn>>>;

/// In-process history keyed by user id.
///
/// The outer map lock is held only long enough to find or insert a user's
/// log; each log has its own mutex, so different users never wait on each
/// other while reading or appending.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    users: RwLock<HashMap<String, TurnLog>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a stored log.
    pub fn user_count(&self) -> usize {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn existing_log(&self, user_id: &str) -> Option<TurnLog> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    fn log_or_create(&self, user_id: &str) -> TurnLog {
        if let Some(log) = self.existing_log(user_id) {
            return log;
        }
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        users.entry(user_id.to_string()).or_default().clone()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn get(&self, user_id: &str) -> Vec<Turn> {
        match self.existing_log(user_id) {
            Some(log) => log.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            None => Vec::new(),
        }
    }

    fn append(&self, user_id: &str, user_text: &str, assistant_text: &str) {
        let log = self.log_or_create(user_id);
        let mut turns = log.lock().unwrap_or_else(PoisonError::into_inner);
        turns.push(Turn::user(user_text));
        turns.push(Turn::assistant(assistant_text));
        tracing::debug!(user = %user_id, turns = turns.len(), "history appended");
    }

    fn clear(&self, user_id: &str) -> bool {
        let removed = self
            .users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
            .is_some();
        tracing::debug!(user = %user_id, removed, "history cleared");
        removed
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
