//! Common test utilities for driver tests
//!
//! Provides an in-memory service implementing every driver seam:
//! - Counting each remote call
//! - Scripting failures per operation
//! - Ending or forgetting sessions the way a server would

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use solidb_sql_driver::config::{Config, RetrySettings};
use solidb_sql_driver::retry::Backoff;
use solidb_sql_driver::transport::protocol::{
    Column, CreateSessionRequest, CreatedSession, EntryType, ExecuteRequest, NodeConfig,
    OperationParams, QueryStats, ResultPart, ResultSet, SchemeEntry, SessionState, StatusCode,
    TxControl, TxSettings,
};
use solidb_sql_driver::transport::{
    AttachStream, CoordinationService, QueryService, ResultStream, SessionService,
};
use solidb_sql_driver::{DriverError, DriverResult};
use tokio::sync::mpsc;

type StateSender = mpsc::UnboundedSender<DriverResult<SessionState>>;

/// Config with millisecond backoffs so retry tests stay fast.
pub fn test_config() -> Config {
    Config::new()
        .with_retry(RetrySettings {
            max_attempts: 5,
            fast: Backoff::new(Duration::from_millis(1), 2),
            slow: Backoff::new(Duration::from_millis(2), 2),
        })
        .with_session_delete_timeout(Some(Duration::from_millis(200)))
        .with_session_create_timeout(Some(Duration::from_secs(2)))
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

pub fn single_row_set() -> ResultSet {
    ResultSet {
        columns: vec![Column {
            name: "one".to_string(),
            type_name: "Int32".to_string(),
        }],
        rows: vec![json!({"one": 1})],
    }
}

pub fn part(index: u64, rows: Vec<serde_json::Value>) -> ResultPart {
    ResultPart {
        result_set_index: index,
        result_set: Some(ResultSet {
            columns: vec![Column {
                name: "v".to_string(),
                type_name: "Int64".to_string(),
            }],
            rows,
        }),
        tx_id: None,
        stats: None,
    }
}

pub fn stats_part(index: u64, duration_us: u64) -> ResultPart {
    ResultPart {
        result_set_index: index,
        result_set: None,
        tx_id: None,
        stats: Some(QueryStats {
            total_duration_us: duration_us,
            ..Default::default()
        }),
    }
}

#[derive(Default)]
pub struct MockService {
    next_session: AtomicU64,
    next_tx: AtomicU64,

    pub create_calls: AtomicU32,
    pub attach_calls: AtomicU32,
    pub delete_calls: AtomicU32,
    pub execute_calls: AtomicU32,
    pub begin_calls: AtomicU32,
    pub commit_calls: AtomicU32,
    pub rollback_calls: AtomicU32,
    pub create_node_calls: AtomicU32,
    pub alter_node_calls: AtomicU32,
    pub drop_node_calls: AtomicU32,
    pub describe_node_calls: AtomicU32,

    live: Mutex<HashSet<String>>,
    control: Mutex<HashMap<String, StateSender>>,
    failures: Mutex<HashMap<&'static str, VecDeque<DriverError>>>,
    parts: Mutex<VecDeque<Vec<DriverResult<ResultPart>>>>,
    attach_delay: Mutex<Option<Duration>>,
    delete_delay: Mutex<Option<Duration>>,

    pub executed: Mutex<Vec<ExecuteRequest>>,
    pub created: Mutex<Vec<CreateSessionRequest>>,
    pub deleted: Mutex<Vec<String>>,
    pub last_params: Mutex<Option<OperationParams>>,
    pub nodes: Mutex<HashMap<String, NodeConfig>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` calls of `op` fail with `err`.
    pub fn fail(&self, op: &'static str, times: usize, err: DriverError) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    fn take_failure(&self, op: &'static str) -> DriverResult<()> {
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(|q| q.pop_front())
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Scripts the reply parts of the next execute call.
    pub fn push_parts(&self, parts: Vec<DriverResult<ResultPart>>) {
        self.parts.lock().unwrap().push_back(parts);
    }

    pub fn set_attach_delay(&self, delay: Duration) {
        *self.attach_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_delete_delay(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = Some(delay);
    }

    /// Server evicts the session: it is forgotten and its control stream ends.
    pub fn expire_session(&self, session_id: &str) {
        self.live.lock().unwrap().remove(session_id);
        self.control.lock().unwrap().remove(session_id);
    }

    /// Control stream fails with `err`.
    pub fn break_session(&self, session_id: &str, err: DriverError) {
        if let Some(tx) = self.control.lock().unwrap().remove(session_id) {
            let _ = tx.send(Err(err));
        }
    }

    /// Server forgets the session but its control stream stays open.
    pub fn forget_session(&self, session_id: &str) {
        self.live.lock().unwrap().remove(session_id);
    }

    pub fn is_live(&self, session_id: &str) -> bool {
        self.live.lock().unwrap().contains(session_id)
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    fn check_session(&self, session_id: &str) -> DriverResult<()> {
        if self.is_live(session_id) {
            Ok(())
        } else {
            Err(DriverError::operation(
                StatusCode::BadSession,
                format!("unknown session {}", session_id),
            ))
        }
    }
}

#[async_trait]
impl SessionService for MockService {
    async fn create_session(&self, request: CreateSessionRequest) -> DriverResult<CreatedSession> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure("create_session")?;

        let id = format!("session-{}", self.next_session.fetch_add(1, Ordering::SeqCst) + 1);
        self.created.lock().unwrap().push(request);
        self.live.lock().unwrap().insert(id.clone());
        Ok(CreatedSession {
            session_id: id,
            node_id: 1,
        })
    }

    async fn attach_session(&self, session_id: &str) -> DriverResult<AttachStream> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.attach_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.take_failure("attach_session")?;
        self.check_session(session_id)?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Ok(SessionState::success()))
            .map_err(|_| DriverError::unavailable("control stream closed"))?;
        self.control
            .lock()
            .unwrap()
            .insert(session_id.to_string(), tx);

        Ok(Box::pin(async_stream::stream! {
            while let Some(state) = rx.recv().await {
                yield state;
            }
        }))
    }

    async fn delete_session(&self, session_id: &str) -> DriverResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delete_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.take_failure("delete_session")?;

        self.deleted.lock().unwrap().push(session_id.to_string());
        self.control.lock().unwrap().remove(session_id);
        if self.live.lock().unwrap().remove(session_id) {
            Ok(())
        } else {
            Err(DriverError::operation(
                StatusCode::BadSession,
                format!("unknown session {}", session_id),
            ))
        }
    }
}

#[async_trait]
impl QueryService for MockService {
    async fn execute(&self, request: ExecuteRequest) -> DriverResult<ResultStream> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().unwrap().push(request.clone());
        self.take_failure("execute")?;
        self.check_session(&request.session_id)?;

        let mut parts = self.parts.lock().unwrap().pop_front().unwrap_or_else(|| {
            vec![Ok(ResultPart {
                result_set_index: 0,
                result_set: Some(single_row_set()),
                tx_id: None,
                stats: None,
            })]
        });

        if let TxControl::Begin { .. } = request.tx_control {
            let tx_id = format!("tx-{}", self.next_tx.fetch_add(1, Ordering::SeqCst) + 1);
            match parts.first_mut() {
                Some(Ok(first)) => first.tx_id = Some(tx_id),
                _ => parts.insert(
                    0,
                    Ok(ResultPart {
                        result_set_index: 0,
                        result_set: None,
                        tx_id: Some(tx_id),
                        stats: None,
                    }),
                ),
            }
        }

        Ok(Box::pin(futures::stream::iter(parts)))
    }

    async fn begin_transaction(
        &self,
        session_id: &str,
        _settings: TxSettings,
    ) -> DriverResult<String> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure("begin_transaction")?;
        self.check_session(session_id)?;
        Ok(format!("tx-{}", self.next_tx.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn commit_transaction(&self, session_id: &str, _tx_id: &str) -> DriverResult<()> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure("commit_transaction")?;
        self.check_session(session_id)
    }

    async fn rollback_transaction(&self, session_id: &str, _tx_id: &str) -> DriverResult<()> {
        self.rollback_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure("rollback_transaction")?;
        self.check_session(session_id)
    }
}

#[async_trait]
impl CoordinationService for MockService {
    async fn create_node(
        &self,
        path: &str,
        config: NodeConfig,
        params: OperationParams,
    ) -> DriverResult<()> {
        self.create_node_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params);
        self.take_failure("create_node")?;
        self.nodes.lock().unwrap().insert(path.to_string(), config);
        Ok(())
    }

    async fn alter_node(
        &self,
        path: &str,
        config: NodeConfig,
        params: OperationParams,
    ) -> DriverResult<()> {
        self.alter_node_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params);
        self.take_failure("alter_node")?;
        match self.nodes.lock().unwrap().get_mut(path) {
            Some(existing) => {
                *existing = config;
                Ok(())
            }
            None => Err(DriverError::operation(
                StatusCode::SchemeError,
                format!("path not found: {}", path),
            )),
        }
    }

    async fn drop_node(&self, path: &str, params: OperationParams) -> DriverResult<()> {
        self.drop_node_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params);
        self.take_failure("drop_node")?;
        match self.nodes.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(DriverError::operation(
                StatusCode::SchemeError,
                format!("path not found: {}", path),
            )),
        }
    }

    async fn describe_node(
        &self,
        path: &str,
        params: OperationParams,
    ) -> DriverResult<(SchemeEntry, NodeConfig)> {
        self.describe_node_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params);
        self.take_failure("describe_node")?;
        match self.nodes.lock().unwrap().get(path) {
            Some(config) => Ok((
                SchemeEntry {
                    name: path.rsplit('/').next().unwrap_or(path).to_string(),
                    owner: "root".to_string(),
                    entry_type: EntryType::CoordinationNode,
                },
                config.clone(),
            )),
            None => Err(DriverError::operation(
                StatusCode::SchemeError,
                format!("path not found: {}", path),
            )),
        }
    }
}
