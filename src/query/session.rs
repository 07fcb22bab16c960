use std::sync::Arc;
use std::time::Duration;

use super::options::ExecuteOptions;
use super::result::QueryResult;
use super::transaction::Transaction;
use crate::error::{DriverError, DriverResult, ResultExt};
use crate::retry::must_evict_session;
use crate::session::{Session, Status};
use crate::transport::protocol::{StatusCode, TxControl, TxSettings};
use crate::transport::QueryService;

/// Session for running statements and transactions.
#[derive(Clone)]
pub struct QuerySession {
    session: Session,
    service: Arc<dyn QueryService>,
}

impl std::fmt::Debug for QuerySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("QuerySession").field(&self.session).finish()
    }
}

impl QuerySession {
    pub(crate) fn new(session: Session, service: Arc<dyn QueryService>) -> Self {
        Self { session, service }
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

    /// Underlying lifecycle handle.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn service(&self) -> &Arc<dyn QueryService> {
        &self.service
    }

    pub async fn close(&self) -> DriverResult<()> {
        self.session.close().await
    }

    pub async fn close_within(&self, timeout: Duration) -> DriverResult<()> {
        self.session.close_within(timeout).await
    }

    /// Starts a lazy transaction. No round trip happens here, even for a
    /// dead session: the first statement reports the failure.
    pub fn begin(&self, settings: TxSettings) -> Transaction {
        Transaction::new(self.clone(), settings)
    }

    /// Runs a statement outside any transaction and returns its result stream.
    pub async fn query(&self, query: &str, options: &ExecuteOptions) -> DriverResult<QueryResult> {
        self.statement(query, options, TxControl::None).await
    }

    /// Runs a statement outside any transaction, discarding its rows.
    pub async fn exec(&self, query: &str, options: &ExecuteOptions) -> DriverResult<()> {
        self.query(query, options).await?.drain().await
    }

    pub(crate) async fn statement(
        &self,
        query: &str,
        options: &ExecuteOptions,
        tx_control: TxControl,
    ) -> DriverResult<QueryResult> {
        if !self.session.is_alive() {
            return Err(DriverError::operation(
                StatusCode::BadSession,
                format!("session '{}' is {}", self.id(), self.status()),
            ))
            .traced();
        }

        let request = options.request(self.id(), query, tx_control);
        let stream = match self.service.execute(request).await {
            Ok(stream) => stream,
            Err(e) => {
                if must_evict_session(&e) {
                    self.session.invalidate();
                }
                return Err(e).traced();
            }
        };

        QueryResult::open(self.session.clone(), stream, options.stats_callback()).await
    }
}
