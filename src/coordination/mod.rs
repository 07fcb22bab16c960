//! Coordination client.
//!
//! Node administration calls are idempotent and go through the retry
//! orchestrator unless auto retry is disabled. Sessions created here are
//! tracked in a [`SessionRegistry`] so [`CoordinationClient::close`] can
//! tear all of them down.

mod registry;
mod session;
mod types;

pub use registry::SessionRegistry;
pub use session::CoordinationSession;
pub use types::{
    ConsistencyMode, CreateSessionOptions, EntryType, NodeConfig, OperationMode, OperationParams,
    RatelimiterCountersMode, SchemeEntry,
};

use std::future::Future;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{DriverError, DriverResult};
use crate::retry::{retry_at, RetryOptions};
use crate::session::{Session, SessionOptions};
use crate::transport::protocol::CreateSessionRequest;
use crate::transport::{CoordinationService, SessionService};

struct ClientInner {
    service: Arc<dyn CoordinationService>,
    sessions: Arc<dyn SessionService>,
    config: Config,
    registry: Arc<SessionRegistry>,
    closed: AtomicBool,
}

impl ClientInner {
    fn params(&self, options: &RetryOptions) -> OperationParams {
        OperationParams::new(
            self.config.operation_timeout,
            self.config.operation_cancel_after,
            options.remaining(),
            OperationMode::Sync,
        )
    }

    fn retry_options(&self, label: &str) -> RetryOptions {
        let options = RetryOptions::from_settings(&self.config.retry)
            .label(label)
            .idempotent(true);
        match self.config.call_timeout {
            Some(timeout) => options.timeout(timeout),
            None => options,
        }
    }

    async fn call<T, F, Fut>(
        &self,
        label: &str,
        location: &'static Location<'static>,
        op: F,
    ) -> DriverResult<T>
    where
        F: Fn(OperationParams) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        let options = self.retry_options(label);
        if !self.config.auto_retry {
            return op(self.params(&options)).await;
        }
        retry_at(&options, |_| op(self.params(&options)), location).await
    }
}

/// Client for coordination nodes and their sessions.
///
/// `CoordinationClient::default()` is an unbound client: every call fails
/// with [`DriverError::NotInitialized`].
#[derive(Clone, Default)]
pub struct CoordinationClient {
    inner: Option<Arc<ClientInner>>,
}

impl CoordinationClient {
    pub fn new<S: CoordinationService>(service: Arc<S>, config: Config) -> Self {
        Self {
            inner: Some(Arc::new(ClientInner {
                service: service.clone(),
                sessions: service,
                config,
                registry: Arc::new(SessionRegistry::new()),
                closed: AtomicBool::new(false),
            })),
        }
    }

    fn inner(&self) -> DriverResult<&Arc<ClientInner>> {
        let inner = self.inner.as_ref().ok_or(DriverError::NotInitialized)?;
        if inner.closed.load(Ordering::Acquire) {
            return Err(DriverError::ClientClosed);
        }
        Ok(inner)
    }

    /// Sessions currently tracked by this client.
    pub fn registry(&self) -> DriverResult<&SessionRegistry> {
        Ok(self.inner()?.registry.as_ref())
    }

    #[track_caller]
    pub fn create_node<'a>(
        &'a self,
        path: &'a str,
        config: NodeConfig,
    ) -> impl Future<Output = DriverResult<()>> + 'a {
        let location = Location::caller();
        async move {
            let inner = self.inner()?;
            inner
                .call("create_node", location, move |params| {
                    inner.service.create_node(path, config.clone(), params)
                })
                .await
        }
    }

    #[track_caller]
    pub fn alter_node<'a>(
        &'a self,
        path: &'a str,
        config: NodeConfig,
    ) -> impl Future<Output = DriverResult<()>> + 'a {
        let location = Location::caller();
        async move {
            let inner = self.inner()?;
            inner
                .call("alter_node", location, move |params| {
                    inner.service.alter_node(path, config.clone(), params)
                })
                .await
        }
    }

    #[track_caller]
    pub fn drop_node<'a>(&'a self, path: &'a str) -> impl Future<Output = DriverResult<()>> + 'a {
        let location = Location::caller();
        async move {
            let inner = self.inner()?;
            inner
                .call("drop_node", location, move |params| {
                    inner.service.drop_node(path, params)
                })
                .await
        }
    }

    #[track_caller]
    pub fn describe_node<'a>(
        &'a self,
        path: &'a str,
    ) -> impl Future<Output = DriverResult<(SchemeEntry, NodeConfig)>> + 'a {
        let location = Location::caller();
        async move {
            let inner = self.inner()?;
            inner
                .call("describe_node", location, move |params| {
                    inner.service.describe_node(path, params)
                })
                .await
        }
    }

    /// Creates a session on the coordination node at `path`. The session
    /// stays registered until it is closed by any path.
    ///
    /// The client keeps its own handle to every registered session, so
    /// dropping the returned handle does not tear the session down. End it
    /// with [`CoordinationSession::close`] or [`CoordinationClient::close`].
    pub async fn create_session(
        &self,
        path: &str,
        options: CreateSessionOptions,
    ) -> DriverResult<CoordinationSession> {
        let inner = self.inner()?;
        let registry = Arc::downgrade(&inner.registry);

        let request = CreateSessionRequest::Coordination {
            path: path.to_string(),
            description: options.description.clone(),
            timeout_millis: options.session_timeout.as_millis() as u64,
        };
        let session_options =
            SessionOptions::new(Some(options.start_timeout), Some(options.stop_timeout))
                .on_closed(move |session_id| {
                    if let Some(registry) = registry.upgrade() {
                        registry.session_closed(session_id);
                    }
                });

        let session = Session::create(inner.sessions.clone(), request, session_options).await?;

        if let Err(e) = inner.registry.session_created(&session) {
            debug!("Session {}: client closed during create", session.id());
            if let Err(close_err) = session.close().await {
                warn!(
                    "Session {}: close after refused registration failed: {}",
                    session.id(),
                    close_err
                );
            }
            return Err(e);
        }
        Ok(CoordinationSession::new(path.to_string(), session))
    }

    /// Closes every registered session and refuses further calls. Closing
    /// an already closed client succeeds.
    pub async fn close(&self) -> DriverResult<()> {
        let inner = self.inner.as_ref().ok_or(DriverError::NotInitialized)?;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("Coordination client closing {} session(s)", inner.registry.len());
        inner.registry.close_sessions().await
    }
}
