use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::transport::protocol::{ExecMode, ExecuteRequest, QueryStats, StatsMode, Syntax, TxControl};

/// Receives every stats part of a result stream.
pub type StatsCallback = Arc<dyn Fn(&QueryStats) + Send + Sync>;

/// Options for a single statement
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    pub parameters: BTreeMap<String, Value>,
    pub exec_mode: ExecMode,
    pub stats_mode: StatsMode,
    pub syntax: Syntax,
    /// Caller asserts that running the statement twice is harmless
    pub idempotent: bool,
    stats_callback: Option<StatsCallback>,
}

impl std::fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("parameters", &self.parameters)
            .field("exec_mode", &self.exec_mode)
            .field("stats_mode", &self.stats_mode)
            .field("syntax", &self.syntax)
            .field("idempotent", &self.idempotent)
            .finish()
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: BTreeMap<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }

    pub fn exec_mode(mut self, mode: ExecMode) -> Self {
        self.exec_mode = mode;
        self
    }

    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Requests statistics at `mode` and hands each stats part to `callback`.
    pub fn stats<F>(mut self, mode: StatsMode, callback: F) -> Self
    where
        F: Fn(&QueryStats) + Send + Sync + 'static,
    {
        self.stats_mode = mode;
        self.stats_callback = Some(Arc::new(callback));
        self
    }

    pub(crate) fn stats_callback(&self) -> Option<StatsCallback> {
        self.stats_callback.clone()
    }

    pub(crate) fn request(
        &self,
        session_id: &str,
        query: &str,
        tx_control: TxControl,
    ) -> ExecuteRequest {
        ExecuteRequest {
            session_id: session_id.to_string(),
            query: query.to_string(),
            parameters: self.parameters.clone(),
            syntax: self.syntax,
            exec_mode: self.exec_mode,
            stats_mode: self.stats_mode,
            tx_control,
        }
    }
}
