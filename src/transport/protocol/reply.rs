use serde::{Deserialize, Serialize};

use super::status::{Issue, StatusCode};
use super::types::{CreatedSession, NodeConfig, ResultPart, SchemeEntry, SessionState};
use crate::error::DriverError;

/// Replies the server sends back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    SessionCreated(CreatedSession),
    SessionState(SessionState),
    Ack,
    ResultPart(ResultPart),
    /// Terminates an execute reply stream
    Done,
    TransactionBegun {
        tx_id: String,
    },
    NodeDescribed {
        entry: SchemeEntry,
        config: NodeConfig,
    },
    Error {
        status: StatusCode,
        #[serde(default)]
        issues: Vec<Issue>,
    },
}

impl Reply {
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Reply::Error {
            status,
            issues: vec![Issue::new(message)],
        }
    }

    /// Turns an error reply into a driver error, passing every other reply through.
    pub fn into_result(self) -> Result<Reply, DriverError> {
        match self {
            Reply::Error { status, issues } => Err(DriverError::Operation { status, issues }),
            other => Ok(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Reply::SessionCreated(_) => "session_created",
            Reply::SessionState(_) => "session_state",
            Reply::Ack => "ack",
            Reply::ResultPart(_) => "result_part",
            Reply::Done => "done",
            Reply::TransactionBegun { .. } => "transaction_begun",
            Reply::NodeDescribed { .. } => "node_described",
            Reply::Error { .. } => "error",
        }
    }
}
