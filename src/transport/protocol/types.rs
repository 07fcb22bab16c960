use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use super::status::{Issue, StatusCode};

/// Server-assigned identity of a freshly allocated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
    pub node_id: u32,
}

/// Parameters for allocating a session handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateSessionRequest {
    Query,
    Coordination {
        path: String,
        description: String,
        timeout_millis: u64,
    },
}

/// Liveness message delivered on a session's control stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub status: StatusCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl SessionState {
    pub fn success() -> Self {
        Self {
            status: StatusCode::Success,
            issues: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxMode {
    #[default]
    SerializableReadWrite,
    SnapshotReadOnly,
    OnlineReadOnly,
    StaleReadOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSettings {
    pub mode: TxMode,
}

impl TxSettings {
    pub fn serializable_read_write() -> Self {
        Self {
            mode: TxMode::SerializableReadWrite,
        }
    }

    pub fn snapshot_read_only() -> Self {
        Self {
            mode: TxMode::SnapshotReadOnly,
        }
    }
}

/// Transaction binding of a single statement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tx", rename_all = "snake_case")]
pub enum TxControl {
    /// Statement runs outside any transaction
    #[default]
    None,
    /// Statement opens a new transaction on the server
    Begin { settings: TxSettings },
    /// Statement joins a transaction already open on the server
    Id { tx_id: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    Parse,
    Validate,
    Explain,
    #[default]
    Execute,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsMode {
    #[default]
    None,
    Basic,
    Full,
    Profile,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Syntax {
    #[default]
    Sql,
    Yql,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub session_id: String,
    pub query: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    pub syntax: Syntax,
    pub exec_mode: ExecMode,
    pub stats_mode: StatsMode,
    pub tx_control: TxControl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    #[serde(default)]
    pub query_plan: Option<String>,
    #[serde(default)]
    pub query_ast: Option<String>,
    #[serde(default)]
    pub total_duration_us: u64,
    #[serde(default)]
    pub total_cpu_time_us: u64,
    #[serde(default)]
    pub process_cpu_time_us: u64,
}

/// One message of an execute reply stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPart {
    pub result_set_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_set: Option<ResultSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueryStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    #[default]
    Unset,
    Strict,
    Relaxed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatelimiterCountersMode {
    #[default]
    Unset,
    Aggregated,
    Detailed,
}

/// Configuration of a coordination node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub self_check_period_millis: u32,
    #[serde(default)]
    pub session_grace_period_millis: u32,
    #[serde(default)]
    pub read_consistency_mode: ConsistencyMode,
    #[serde(default)]
    pub attach_consistency_mode: ConsistencyMode,
    #[serde(default)]
    pub ratelimiter_counters_mode: RatelimiterCountersMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    #[default]
    Unknown,
    Directory,
    Table,
    CoordinationNode,
}

/// Scheme entry describing a node in the database namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeEntry {
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub entry_type: EntryType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    #[default]
    Sync,
    Async,
}

/// Server-side limits attached to an administrative call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_after_ms: Option<u64>,
    pub mode: OperationMode,
}

impl OperationParams {
    /// Builds parameters from the configured limits, capping both by the
    /// time left until `remaining` runs out when the caller has a deadline.
    pub fn new(
        operation_timeout: Option<Duration>,
        cancel_after: Option<Duration>,
        remaining: Option<Duration>,
        mode: OperationMode,
    ) -> Self {
        let cap = |limit: Option<Duration>| match (limit, remaining) {
            (Some(l), Some(r)) => Some(l.min(r)),
            (Some(l), None) => Some(l),
            (None, Some(r)) => Some(r),
            (None, None) => None,
        };

        Self {
            operation_timeout_ms: cap(operation_timeout).map(|d| d.as_millis() as u64),
            cancel_after_ms: cancel_after
                .map(|c| remaining.map_or(c, |r| c.min(r)))
                .map(|d| d.as_millis() as u64),
            mode,
        }
    }
}
