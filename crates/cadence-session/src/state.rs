//! Shared per-session conversation state.
//!
//! Session state is logically singular but physically shared across process
//! instances. The store contract is read-modify-publish with last-write-wins;
//! subscribers observe every published revision in order, with lag handled
//! by the broadcast channel's own overflow policy.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use cadence_core::error::{CadenceError, Result};
use cadence_core::types::{SessionId, SessionState};

/// Channel depth per session. A lagging subscriber skips to the newest
/// revision, which is the only one that matters for display.
const CHANNEL_CAPACITY: usize = 32;

/// External store for mutable session state.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    /// Current state for the session; a session never seen before yields
    /// the default state.
    async fn load(&self, session: SessionId) -> Result<SessionState>;

    /// Replace the session's state. Last write wins.
    async fn publish(&self, session: SessionId, state: SessionState) -> Result<()>;

    /// Subscribe to state revisions published after this call.
    fn subscribe(&self, session: SessionId) -> Result<broadcast::Receiver<SessionState>>;
}

/// Process-local reference implementation.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, SessionState>>,
    channels: Mutex<HashMap<SessionId, broadcast::Sender<SessionState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, session: SessionId) -> Result<broadcast::Sender<SessionState>> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|e| CadenceError::Session(format!("channel lock poisoned: {}", e)))?;
        Ok(channels
            .entry(session)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone())
    }
}

#[async_trait]
impl SessionStateStore for InMemorySessionStore {
    async fn load(&self, session: SessionId) -> Result<SessionState> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| CadenceError::Session(format!("session lock poisoned: {}", e)))?;
        Ok(sessions.get(&session).cloned().unwrap_or_default())
    }

    async fn publish(&self, session: SessionId, state: SessionState) -> Result<()> {
        {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|e| CadenceError::Session(format!("session lock poisoned: {}", e)))?;
            sessions.insert(session, state.clone());
        }
        // A send error only means nobody is listening right now.
        let _ = self.sender(session)?.send(state);
        Ok(())
    }

    fn subscribe(&self, session: SessionId) -> Result<broadcast::Receiver<SessionState>> {
        Ok(self.sender(session)?.subscribe())
    }
}
