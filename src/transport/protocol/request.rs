use serde::{Deserialize, Serialize};

use super::types::{
    CreateSessionRequest, ExecuteRequest, NodeConfig, OperationParams, TxSettings,
};

/// Requests a client can send to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    CreateSession {
        request: CreateSessionRequest,
    },
    /// Opens the control stream of a session. The connection carrying this
    /// request is dedicated to the stream until either side closes it.
    AttachSession {
        session_id: String,
    },
    DeleteSession {
        session_id: String,
    },
    ExecuteQuery(ExecuteRequest),
    BeginTransaction {
        session_id: String,
        settings: TxSettings,
    },
    CommitTransaction {
        session_id: String,
        tx_id: String,
    },
    RollbackTransaction {
        session_id: String,
        tx_id: String,
    },
    CreateNode {
        path: String,
        config: NodeConfig,
        params: OperationParams,
    },
    AlterNode {
        path: String,
        config: NodeConfig,
        params: OperationParams,
    },
    DropNode {
        path: String,
        params: OperationParams,
    },
    DescribeNode {
        path: String,
        params: OperationParams,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::CreateSession { .. } => "create_session",
            Request::AttachSession { .. } => "attach_session",
            Request::DeleteSession { .. } => "delete_session",
            Request::ExecuteQuery(_) => "execute_query",
            Request::BeginTransaction { .. } => "begin_transaction",
            Request::CommitTransaction { .. } => "commit_transaction",
            Request::RollbackTransaction { .. } => "rollback_transaction",
            Request::CreateNode { .. } => "create_node",
            Request::AlterNode { .. } => "alter_node",
            Request::DropNode { .. } => "drop_node",
            Request::DescribeNode { .. } => "describe_node",
        }
    }
}
