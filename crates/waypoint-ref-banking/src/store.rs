//! Session storage.
//!
//! Sessions are held behind a per-session mutex: a caller that wants to run
//! a turn takes the session's lock for the whole turn, so updates to one
//! session serialize while different sessions proceed in parallel. The map
//! itself is only write-locked to insert or remove entries.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use waypoint_contracts::session::{Session, SessionId};

/// Storage for conversation sessions, independent of any backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session and return its id.
    async fn create(&self, session: Session) -> SessionId;

    /// A snapshot of the session.
    async fn get(&self, id: &SessionId) -> Option<Session>;

    /// Insert or replace a session.
    async fn put(&self, session: Session);

    /// Remove a session. Returns whether it existed.
    async fn delete(&self, id: &SessionId) -> bool;

    /// The lockable handle of a session, for read-modify-write updates.
    async fn entry(&self, id: &SessionId) -> Option<Arc<Mutex<Session>>>;

    /// Number of live sessions.
    async fn len(&self) -> usize;
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: Session) -> SessionId {
        let id = session.id;
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        debug!(session_id = %id, "session created");
        id
    }

    async fn get(&self, id: &SessionId) -> Option<Session> {
        let entry = self.entry(id).await?;
        let session = entry.lock().await;
        Some(session.clone())
    }

    async fn put(&self, session: Session) {
        match self.entry(&session.id).await {
            Some(entry) => *entry.lock().await = session,
            None => {
                self.create(session).await;
            }
        }
    }

    async fn delete(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            debug!(session_id = %id, "session deleted");
        }
        removed
    }

    async fn entry(&self, id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
