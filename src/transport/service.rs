//! Remote operations the driver core depends on.
//!
//! The session lifecycle and retry layers only talk to these traits, so the
//! TCP transport and in-memory test doubles are interchangeable.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::protocol::{
    CreateSessionRequest, CreatedSession, ExecuteRequest, NodeConfig, OperationParams,
    ResultPart, SchemeEntry, SessionState, TxSettings,
};
use crate::error::DriverResult;

/// Control stream of an attached session. The stream ending, with or
/// without an error, means the server no longer holds the session.
/// Dropping it releases the underlying transport resources.
pub type AttachStream = BoxStream<'static, DriverResult<SessionState>>;

/// Reply stream of an execute call.
pub type ResultStream = BoxStream<'static, DriverResult<ResultPart>>;

#[async_trait]
pub trait SessionService: Send + Sync + 'static {
    async fn create_session(&self, request: CreateSessionRequest) -> DriverResult<CreatedSession>;

    async fn attach_session(&self, session_id: &str) -> DriverResult<AttachStream>;

    async fn delete_session(&self, session_id: &str) -> DriverResult<()>;
}

#[async_trait]
pub trait QueryService: SessionService {
    async fn execute(&self, request: ExecuteRequest) -> DriverResult<ResultStream>;

    async fn begin_transaction(&self, session_id: &str, settings: TxSettings)
        -> DriverResult<String>;

    async fn commit_transaction(&self, session_id: &str, tx_id: &str) -> DriverResult<()>;

    async fn rollback_transaction(&self, session_id: &str, tx_id: &str) -> DriverResult<()>;
}

#[async_trait]
pub trait CoordinationService: SessionService {
    async fn create_node(
        &self,
        path: &str,
        config: NodeConfig,
        params: OperationParams,
    ) -> DriverResult<()>;

    async fn alter_node(
        &self,
        path: &str,
        config: NodeConfig,
        params: OperationParams,
    ) -> DriverResult<()>;

    async fn drop_node(&self, path: &str, params: OperationParams) -> DriverResult<()>;

    async fn describe_node(
        &self,
        path: &str,
        params: OperationParams,
    ) -> DriverResult<(SchemeEntry, NodeConfig)>;
}
