//! Conversation sessions.
//!
//! Every session owns its own [`Namespace`], so variables from one
//! conversation are never visible to another. The registry hands out each
//! session behind an async mutex: turns of one conversation run one at a
//! time, while unrelated sessions proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::namespace::Namespace;

/// State carried across the turns of one conversation
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub namespace: Namespace,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turns: u64,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            namespace: Namespace::new(),
            created_at: now,
            last_active: now,
            turns: 0,
        }
    }

    /// Mark the start of a turn
    pub fn begin_turn(&mut self) {
        self.turns += 1;
        self.last_active = Utc::now();
    }

    /// Forget every variable (the "reset conversation" action)
    pub fn reset(&mut self) {
        self.namespace.clear();
    }
}

/// Shared handle to a session
pub type SessionHandle = Arc<Mutex<Session>>;

/// All live sessions, keyed by id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for `id`, created on first use
    pub async fn session(&self, id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(session = id, "Creating session");
                Arc::new(Mutex::new(Session::new(id)))
            })
            .clone()
    }

    /// Drop a session; returns whether it existed
    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Value;

    #[test]
    fn test_sessions_are_isolated() {
        tokio_test::block_on(async {
            let registry = SessionRegistry::new();
            let alice = registry.session("alice").await;
            let bob = registry.session("bob").await;

            alice.lock().await.namespace.insert("x", Value::Int(1));

            assert!(alice.lock().await.namespace.contains("x"));
            assert!(!bob.lock().await.namespace.contains("x"));
            assert_eq!(registry.ids().await, vec!["alice", "bob"]);
        });
    }

    #[test]
    fn test_same_id_returns_same_session() {
        tokio_test::block_on(async {
            let registry = SessionRegistry::new();
            let first = registry.session("s").await;
            first.lock().await.begin_turn();

            let again = registry.session("s").await;
            assert!(Arc::ptr_eq(&first, &again));
            assert_eq!(again.lock().await.turns, 1);
            assert_eq!(registry.len().await, 1);

            assert!(registry.remove("s").await);
            assert!(!registry.remove("s").await);
            assert!(registry.is_empty().await);
        });
    }

    #[test]
    fn test_reset_clears_namespace() {
        let mut session = Session::new("s");
        session.namespace.insert("df", Value::Str("x".into()));
        session.reset();
        assert!(session.namespace.is_empty());
    }
}
