use futures::StreamExt;

use super::options::StatsCallback;
use crate::error::{DriverResult, ResultExt};
use crate::retry::must_evict_session;
use crate::session::Session;
use crate::transport::protocol::{ResultPart, ResultSet};
use crate::transport::ResultStream;

/// Streamed reply of one statement.
///
/// Parts that belong to the same result set index are merged, stats parts
/// go to the stats callback. An error that invalidates the session closes
/// it locally even when it arrives mid-stream.
pub struct QueryResult {
    session: Session,
    stream: ResultStream,
    pending: Option<ResultPart>,
    stats_callback: Option<StatsCallback>,
    tx_id: Option<String>,
    index: Option<u64>,
    finished: bool,
}

impl QueryResult {
    /// Waits for the first part so that statement-level failures surface
    /// from the call that issued the statement.
    pub(crate) async fn open(
        session: Session,
        stream: ResultStream,
        stats_callback: Option<StatsCallback>,
    ) -> DriverResult<Self> {
        let mut result = Self {
            session,
            stream,
            pending: None,
            stats_callback,
            tx_id: None,
            index: None,
            finished: false,
        };
        result.pending = result.next_part().await?;
        Ok(result)
    }

    async fn next_part(&mut self) -> DriverResult<Option<ResultPart>> {
        if self.finished {
            return Ok(None);
        }
        match self.stream.next().await {
            Some(Ok(mut part)) => {
                if let Some(tx_id) = part.tx_id.take() {
                    self.tx_id = Some(tx_id);
                }
                if let Some(stats) = part.stats.take() {
                    if let Some(callback) = &self.stats_callback {
                        callback(&stats);
                    }
                }
                Ok(Some(part))
            }
            Some(Err(e)) => {
                self.finished = true;
                if must_evict_session(&e) {
                    self.session.invalidate();
                }
                Err(e).traced()
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    async fn take_part(&mut self) -> DriverResult<Option<ResultPart>> {
        match self.pending.take() {
            Some(part) => Ok(Some(part)),
            None => self.next_part().await,
        }
    }

    /// Next complete result set, or `None` once the stream is exhausted.
    pub async fn next_result_set(&mut self) -> DriverResult<Option<ResultSet>> {
        let (index, mut set) = loop {
            match self.take_part().await? {
                Some(ResultPart {
                    result_set_index,
                    result_set: Some(set),
                    ..
                }) => break (result_set_index, set),
                Some(_) => continue,
                None => return Ok(None),
            }
        };

        loop {
            match self.take_part().await? {
                Some(ResultPart {
                    result_set_index,
                    result_set: Some(more),
                    ..
                }) if result_set_index == index => {
                    set.rows.extend(more.rows);
                    if set.columns.is_empty() {
                        set.columns = more.columns;
                    }
                }
                Some(part) if part.result_set.is_some() => {
                    self.pending = Some(part);
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }

        self.index = Some(index);
        Ok(Some(set))
    }

    /// Index of the result set last returned by `next_result_set`.
    pub fn current_index(&self) -> Option<u64> {
        self.index
    }

    /// Transaction id reported by the server, if any.
    pub fn tx_id(&self) -> Option<&str> {
        self.tx_id.as_deref()
    }

    pub async fn collect(mut self) -> DriverResult<Vec<ResultSet>> {
        let mut sets = Vec::new();
        while let Some(set) = self.next_result_set().await? {
            sets.push(set);
        }
        Ok(sets)
    }

    /// Consumes the rest of the stream, discarding rows.
    pub async fn drain(mut self) -> DriverResult<()> {
        self.pending = None;
        while self.next_part().await?.is_some() {}
        Ok(())
    }
}
