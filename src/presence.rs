use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorPresence {
    pub user_id: String,
    pub user_name: String,
}

// Replicated soft-lock map: entry id -> who has it open for editing.
// Purely in-memory; a fresh replica starts empty and converges as events
// arrive. Locks are advisory and never persisted.
#[derive(Clone, Default)]
pub struct PresenceTracker {
    locks: Arc<Mutex<HashMap<String, EditorPresence>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply_start(&self, entry_id: &str, user_id: &str, user_name: &str) -> Option<EditorPresence> {
        let mut locks = self.locks.lock().await;
        locks.insert(
            entry_id.to_string(),
            EditorPresence {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
            },
        )
    }

    // A stop only clears the lock when it comes from the current holder, so
    // a stale stop from a superseded session cannot clear a newer lock.
    pub async fn apply_stop(&self, entry_id: &str, user_id: &str) -> bool {
        let mut locks = self.locks.lock().await;
        match locks.get(entry_id) {
            Some(holder) if holder.user_id == user_id => {
                locks.remove(entry_id);
                true
            }
            _ => false,
        }
    }

    pub async fn purge_user(&self, user_id: &str) -> Vec<String> {
        let mut locks = self.locks.lock().await;
        let released: Vec<String> = locks
            .iter()
            .filter(|(_, holder)| holder.user_id == user_id)
            .map(|(entry_id, _)| entry_id.clone())
            .collect();
        for entry_id in &released {
            locks.remove(entry_id);
        }
        if !released.is_empty() {
            tracing::info!(user_id = %user_id, count = released.len(), "released editing locks after disconnect");
        }
        released
    }

    pub async fn holder(&self, entry_id: &str) -> Option<EditorPresence> {
        let locks = self.locks.lock().await;
        locks.get(entry_id).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, EditorPresence> {
        let locks = self.locks.lock().await;
        locks.clone()
    }
}

// Editor windows open on this client. Refresh re-renders can steal focus
// from a modal editor, so the service reasserts editor focus after the
// re-render batch settles whenever this registry is non-empty.
#[derive(Clone, Default)]
pub struct WindowRegistry {
    open_editors: Arc<Mutex<HashSet<String>>>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, entry_id: &str) {
        let mut editors = self.open_editors.lock().await;
        editors.insert(entry_id.to_string());
    }

    pub async fn close(&self, entry_id: &str) -> bool {
        let mut editors = self.open_editors.lock().await;
        editors.remove(entry_id)
    }

    pub async fn any_open(&self) -> bool {
        let editors = self.open_editors.lock().await;
        !editors.is_empty()
    }

    pub async fn is_open(&self, entry_id: &str) -> bool {
        let editors = self.open_editors.lock().await;
        editors.contains(entry_id)
    }
}
