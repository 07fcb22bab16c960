use std::time::Duration;

use crate::error::DriverResult;
use crate::session::{Session, Status};

/// Session attached to a coordination node.
#[derive(Debug, Clone)]
pub struct CoordinationSession {
    path: String,
    session: Session,
}

impl CoordinationSession {
    pub(crate) fn new(path: String, session: Session) -> Self {
        Self { path, session }
    }

    /// Coordination node the session is attached to.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.session.id()
    }

    pub fn node_id(&self) -> u32 {
        self.session.node_id()
    }

    pub fn status(&self) -> Status {
        self.session.status()
    }

    pub fn is_alive(&self) -> bool {
        self.session.is_alive()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn close(&self) -> DriverResult<()> {
        self.session.close().await
    }

    pub async fn close_within(&self, timeout: Duration) -> DriverResult<()> {
        self.session.close_within(timeout).await
    }
}
