use tracing::debug;

use super::options::ExecuteOptions;
use super::result::QueryResult;
use super::session::QuerySession;
use crate::error::{DriverError, DriverResult, ResultExt};
use crate::retry::must_evict_session;
use crate::transport::protocol::{TxControl, TxSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
enum TxState {
    /// Nothing sent yet; the first statement opens the transaction
    Lazy,
    Active(String),
    Finished,
}

/// Transaction bound to one session.
///
/// Creating it costs no round trip: the first statement carries a begin
/// control and the server answers with the transaction id that later
/// statements join.
pub struct Transaction {
    session: QuerySession,
    settings: TxSettings,
    state: TxState,
}

impl Transaction {
    pub(crate) fn new(session: QuerySession, settings: TxSettings) -> Self {
        Self {
            session,
            settings,
            state: TxState::Lazy,
        }
    }

    /// Server transaction id, once a statement or `ensure_started` opened it.
    pub fn id(&self) -> Option<&str> {
        match &self.state {
            TxState::Active(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == TxState::Finished
    }

    fn control(&self) -> DriverResult<TxControl> {
        match &self.state {
            TxState::Lazy => Ok(TxControl::Begin {
                settings: self.settings,
            }),
            TxState::Active(id) => Ok(TxControl::Id { tx_id: id.clone() }),
            TxState::Finished => Err(DriverError::TransactionError(
                "Transaction already finished".to_string(),
            )),
        }
    }

    /// Opens the server transaction now instead of on the first statement.
    pub async fn ensure_started(&mut self) -> DriverResult<&str> {
        if self.state == TxState::Lazy {
            let tx_id = self
                .session
                .service()
                .begin_transaction(self.session.id(), self.settings)
                .await
                .inspect_err(|e| self.evict_on(e))
                .traced()?;
            debug!("Session {}: transaction {} begun", self.session.id(), tx_id);
            self.state = TxState::Active(tx_id);
        }
        match &self.state {
            TxState::Active(id) => Ok(id),
            _ => Err(DriverError::TransactionError(
                "Transaction already finished".to_string(),
            )),
        }
    }

    pub async fn query(&mut self, query: &str, options: &ExecuteOptions) -> DriverResult<QueryResult> {
        let control = self.control()?;
        let opening = matches!(control, TxControl::Begin { .. });
        let result = self.session.statement(query, options, control).await?;

        if opening {
            let tx_id = result.tx_id().ok_or_else(|| {
                DriverError::TransactionError(
                    "Server did not report a transaction id".to_string(),
                )
            })?;
            debug!("Session {}: transaction {} begun", self.session.id(), tx_id);
            self.state = TxState::Active(tx_id.to_string());
        }
        Ok(result)
    }

    pub async fn exec(&mut self, query: &str, options: &ExecuteOptions) -> DriverResult<()> {
        self.query(query, options).await?.drain().await
    }

    /// Commits. Without any statement executed there is nothing to commit.
    pub async fn commit(&mut self) -> DriverResult<()> {
        match std::mem::replace(&mut self.state, TxState::Finished) {
            TxState::Lazy => Ok(()),
            TxState::Active(tx_id) => self
                .session
                .service()
                .commit_transaction(self.session.id(), &tx_id)
                .await
                .inspect_err(|e| self.evict_on(e))
                .traced(),
            TxState::Finished => Err(DriverError::TransactionError(
                "Transaction already finished".to_string(),
            )),
        }
    }

    /// Rolls back. Without any statement executed this is a no-op.
    pub async fn rollback(&mut self) -> DriverResult<()> {
        match std::mem::replace(&mut self.state, TxState::Finished) {
            TxState::Lazy => Ok(()),
            TxState::Active(tx_id) => self
                .session
                .service()
                .rollback_transaction(self.session.id(), &tx_id)
                .await
                .inspect_err(|e| self.evict_on(e))
                .traced(),
            TxState::Finished => Err(DriverError::TransactionError(
                "Transaction already finished".to_string(),
            )),
        }
    }

    fn evict_on(&self, err: &DriverError) {
        if must_evict_session(err) {
            self.session.session().invalidate();
        }
    }
}
