use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{DriverError, DriverResult};
use crate::session::Session;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    closed: bool,
}

/// Sessions a client created and has not closed yet.
///
/// Sessions leave the registry from their own teardown, so a session closed
/// by the server disappears without the client noticing.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a new session. Fails once the registry has been closed.
    /// A session already torn down is not recorded.
    pub fn session_created(&self, session: &Session) -> DriverResult<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(DriverError::ClientClosed);
        }
        if session.status().is_terminal() {
            debug!("Session {}: closed before registration", session.id());
            return Ok(());
        }
        inner
            .sessions
            .insert(session.id().to_string(), session.clone());
        Ok(())
    }

    pub fn session_closed(&self, session_id: &str) {
        if self.lock().sessions.remove(session_id).is_some() {
            debug!("Session {}: unregistered", session_id);
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Refuses further registrations and closes every recorded session.
    /// Sessions are closed outside the lock; the first failure is returned
    /// after all of them were attempted.
    pub async fn close_sessions(&self) -> DriverResult<()> {
        let snapshot: Vec<Session> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.sessions.values().cloned().collect()
        };

        let mut first_error = None;
        for session in snapshot {
            if let Err(e) = session.close().await {
                warn!("Session {}: close during shutdown failed: {}", session.id(), e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
