//! Query client: sessions for statements and lazy transactions, plus a
//! retried unit-of-work helper that runs each attempt on a fresh session.

mod options;
mod result;
mod session;
mod transaction;

pub use options::{ExecuteOptions, StatsCallback};
pub use result::QueryResult;
pub use session::QuerySession;
pub use transaction::Transaction;

use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::DriverResult;
use crate::retry::{must_evict_session, retry_at, RetryOptions};
use crate::session::{Session, SessionOptions};
use crate::transport::protocol::{CreateSessionRequest, ResultSet};
use crate::transport::{QueryService, SessionService};

#[derive(Clone)]
pub struct QueryClient {
    service: Arc<dyn QueryService>,
    sessions: Arc<dyn SessionService>,
    config: Config,
}

impl QueryClient {
    pub fn new<S: QueryService>(service: Arc<S>, config: Config) -> Self {
        Self {
            service: service.clone(),
            sessions: service,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocates and attaches a new session.
    pub async fn create_session(&self) -> DriverResult<QuerySession> {
        let session = Session::create(
            self.sessions.clone(),
            CreateSessionRequest::Query,
            SessionOptions::new(
                self.config.session_create_timeout,
                self.config.session_delete_timeout,
            ),
        )
        .await?;
        Ok(QuerySession::new(session, self.service.clone()))
    }

    /// Retry options seeded from the client configuration.
    pub fn retry_options(&self, idempotent: bool) -> RetryOptions {
        let options = RetryOptions::from_settings(&self.config.retry)
            .label("query")
            .idempotent(idempotent);
        match self.config.call_timeout {
            Some(timeout) => options.timeout(timeout),
            None => options,
        }
    }

    /// Runs `f` on a fresh session per attempt. Retriable failures are
    /// retried only when `idempotent` is set and auto retry is enabled.
    #[track_caller]
    pub fn run<'a, T, F, Fut>(
        &'a self,
        idempotent: bool,
        f: F,
    ) -> impl Future<Output = DriverResult<T>> + 'a
    where
        F: Fn(QuerySession) -> Fut + 'a,
        Fut: Future<Output = DriverResult<T>> + 'a,
        T: 'a,
    {
        let location = Location::caller();
        async move {
            let options = self.retry_options(idempotent);
            self.run_at(options, f, location).await
        }
    }

    /// Like [`run`](Self::run) with caller-built retry options, for a
    /// deadline, a cancel token or a trace hook.
    #[track_caller]
    pub fn run_with<'a, T, F, Fut>(
        &'a self,
        options: RetryOptions,
        f: F,
    ) -> impl Future<Output = DriverResult<T>> + 'a
    where
        F: Fn(QuerySession) -> Fut + 'a,
        Fut: Future<Output = DriverResult<T>> + 'a,
        T: 'a,
    {
        self.run_at(options, f, Location::caller())
    }

    async fn run_at<T, F, Fut>(
        &self,
        options: RetryOptions,
        f: F,
        location: &'static Location<'static>,
    ) -> DriverResult<T>
    where
        F: Fn(QuerySession) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        if !self.config.auto_retry {
            return self.attempt(&f).await;
        }
        let f = &f;
        retry_at(&options, |_| self.attempt(f), location).await
    }

    async fn attempt<T, F, Fut>(&self, f: &F) -> DriverResult<T>
    where
        F: Fn(QuerySession) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        let session = self.create_session().await?;
        let result = f(session.clone()).await;

        if let Err(e) = &result {
            if must_evict_session(e) {
                session.session().invalidate();
            }
        }
        if let Err(e) = session.close().await {
            debug!("Session {}: close after unit of work failed: {}", session.id(), e);
        }
        result
    }

    /// Runs one statement through [`run`](Self::run), idempotent when the
    /// options say so.
    #[track_caller]
    pub fn exec<'a>(
        &'a self,
        query: &'a str,
        options: &'a ExecuteOptions,
    ) -> impl Future<Output = DriverResult<()>> + 'a {
        self.run_at(
            self.retry_options(options.idempotent),
            move |session: QuerySession| async move { session.exec(query, options).await },
            Location::caller(),
        )
    }

    /// Runs one statement and collects every result set.
    #[track_caller]
    pub fn query_rows<'a>(
        &'a self,
        query: &'a str,
        options: &'a ExecuteOptions,
    ) -> impl Future<Output = DriverResult<Vec<ResultSet>>> + 'a {
        self.run_at(
            self.retry_options(options.idempotent),
            move |session: QuerySession| async move {
                session.query(query, options).await?.collect().await
            },
            Location::caller(),
        )
    }
}
