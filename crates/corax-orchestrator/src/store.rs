//! Session persistence
//!
//! The engine loads a [`SessionState`], runs one traversal over it, and
//! saves it back - including the suspended shape where a transition request
//! is parked waiting for approval. The store is the only thing that outlives
//! a traversal, so every gate field has to round-trip through it.

use std::collections::HashMap;

use async_trait::async_trait;
use corax_core::{Result, SessionKey, SessionState};
use tokio::sync::RwLock;

/// Storage backend for session state
///
/// `save` runs after every traversal, suspensions included. Implementations
/// must return the state exactly as stored; the approval gate depends on
/// `awaiting_user_approval`, `phase_transition_pending` and
/// `just_transitioned_to` surviving the round trip.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session, `None` when the key has never been saved
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionState>>;

    /// Persist a session under its key, replacing any previous state
    async fn save(&self, key: &SessionKey, state: &SessionState) -> Result<()>;

    /// Delete a session; returns whether one existed
    async fn remove(&self, key: &SessionKey) -> Result<bool>;

    /// Session ids stored for one user and project, sorted
    async fn list(&self, user_id: &str, project_id: &str) -> Result<Vec<String>>;

    /// Number of stored sessions
    async fn count(&self) -> Result<usize>;
}

/// Default store: a map behind an async lock
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionState>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(key).cloned())
    }

    async fn save(&self, key: &SessionKey, state: &SessionState) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(key.clone(), state.clone());
        Ok(())
    }

    async fn remove(&self, key: &SessionKey) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(key).is_some())
    }

    async fn list(&self, user_id: &str, project_id: &str) -> Result<Vec<String>> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions
            .keys()
            .filter(|k| k.user_id == user_id && k.project_id == project_id)
            .map(|k| k.session_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn count(&self) -> Result<usize> {
        let sessions = self.sessions.read().await;
        Ok(sessions.len())
    }
}
