//! Server-attached session handles.
//!
//! A [`Session`] is created in three steps: the server allocates a handle,
//! the control stream is attached and confirmed, and a keepalive worker
//! starts watching that stream. Teardown (cancel the stream, mark the
//! session `Closing`, delete it on the server, mark it `Closed`) runs
//! exactly once, whether it is triggered by [`Session::close`], by the
//! server ending the control stream, or by dropping the last handle.

mod closer;
mod keepalive;
mod status;

pub use status::{AtomicStatus, Status};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DriverError, DriverResult};
use crate::transport::protocol::CreateSessionRequest;
use crate::transport::SessionService;
use closer::{CloseOnce, Teardown};
use keepalive::Exited;

/// Runs once after teardown finished, with the session id.
pub type OnClosed = Box<dyn FnOnce(&str) + Send>;

/// Per-session construction and teardown settings
#[derive(Default)]
pub struct SessionOptions {
    /// Bound on allocation plus attach
    pub create_timeout: Option<Duration>,
    /// Bound on the server-side delete; falls back to the closing caller's
    /// timeout when unset
    pub delete_timeout: Option<Duration>,
    pub on_closed: Option<OnClosed>,
}

impl SessionOptions {
    pub fn new(create_timeout: Option<Duration>, delete_timeout: Option<Duration>) -> Self {
        Self {
            create_timeout,
            delete_timeout,
            on_closed: None,
        }
    }

    pub fn on_closed<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        self.on_closed = Some(Box::new(hook));
        self
    }
}

struct SessionCore {
    id: String,
    node_id: u32,
    status: Arc<AtomicStatus>,
    closer: Arc<CloseOnce>,
    stream_token: CancellationToken,
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        // Releasing the control stream lets the keepalive worker run teardown.
        self.stream_token.cancel();
    }
}

/// Handle to one attached server session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionCore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("node_id", &self.inner.node_id)
            .field("status", &self.status())
            .finish()
    }
}

/// Deletes an allocated handle if creation is abandoned while attaching.
struct OrphanGuard {
    service: Arc<dyn SessionService>,
    session_id: String,
    armed: bool,
}

impl OrphanGuard {
    fn defuse(&mut self) {
        self.armed = false;
    }
}

impl Drop for OrphanGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                "Session {}: abandoned without a runtime, server handle leaked",
                self.session_id
            );
            return;
        };

        let session_id = self.session_id.clone();
        let service = self.service.clone();
        handle.spawn(async move {
            if let Err(e) = service.delete_session(&session_id).await {
                warn!("Session {}: cleanup after abandoned create failed: {}", session_id, e);
            }
        });
    }
}

/// Bounds `fut` by `deadline` when there is one.
async fn within<T, F>(deadline: Option<Instant>, fut: F) -> DriverResult<T>
where
    F: Future<Output = DriverResult<T>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .unwrap_or(Err(DriverError::DeadlineExceeded)),
        None => fut.await,
    }
}

impl Session {
    /// Allocates and attaches a session.
    ///
    /// The create timeout bounds allocation plus attach. Either a usable
    /// session is returned or the server handle has been deleted (or its
    /// deletion is under way when the call was abandoned).
    pub async fn create(
        service: Arc<dyn SessionService>,
        request: CreateSessionRequest,
        options: SessionOptions,
    ) -> DriverResult<Session> {
        let deadline = options.create_timeout.map(|limit| Instant::now() + limit);

        let created = within(deadline, service.create_session(request)).await?;
        let session_id = created.session_id;
        debug!("Session {}: allocated on node {}", session_id, created.node_id);

        let mut guard = OrphanGuard {
            service: service.clone(),
            session_id: session_id.clone(),
            armed: true,
        };

        let attached = within(deadline, keepalive::attach(service.as_ref(), &session_id)).await;
        let stream = match attached {
            Ok(stream) => stream,
            Err(source) => {
                // Detached from the caller and outside the create deadline.
                guard.defuse();
                let cleanup = tokio::spawn(Self::discard(
                    service,
                    session_id.clone(),
                    source,
                    options.delete_timeout,
                ));
                return Err(cleanup.await.unwrap_or_else(|e| {
                    DriverError::Internal(format!(
                        "Session {}: cleanup task failed: {}",
                        session_id, e
                    ))
                }));
            }
        };

        let status = Arc::new(AtomicStatus::new());
        let stream_token = CancellationToken::new();
        let (exit_tx, exited) = Exited::channel();

        let closer = Arc::new(CloseOnce::new(teardown(
            service.clone(),
            session_id.clone(),
            status.clone(),
            stream_token.clone(),
            exited,
            options.delete_timeout,
            options.on_closed,
        )));

        keepalive::spawn(
            session_id.clone(),
            stream,
            stream_token.clone(),
            exit_tx,
            closer.clone(),
        );

        // Stays terminal if the stream already ended.
        if status.set_idle() {
            debug!("Session {}: idle", session_id);
        }
        guard.defuse();

        Ok(Session {
            inner: Arc::new(SessionCore {
                id: session_id,
                node_id: created.node_id,
                status,
                closer,
                stream_token,
            }),
        })
    }

    /// Deletes a handle whose attach failed. Both failures surface when the
    /// delete fails as well.
    async fn discard(
        service: Arc<dyn SessionService>,
        session_id: String,
        source: DriverError,
        delete_timeout: Option<Duration>,
    ) -> DriverError {
        debug!("Session {}: attach failed: {}", session_id, source);
        let deadline = delete_timeout.map(|limit| Instant::now() + limit);
        let deleted = within(deadline, service.delete_session(&session_id)).await;

        match deleted {
            Ok(()) => source,
            Err(cleanup) => {
                warn!(
                    "Session {}: delete after failed attach also failed: {}",
                    session_id, cleanup
                );
                DriverError::Construction {
                    session_id,
                    source: Box::new(source),
                    cleanup: Box::new(cleanup),
                }
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Node that owns the session, for routing follow-up calls.
    pub fn node_id(&self) -> u32 {
        self.inner.node_id
    }

    pub fn status(&self) -> Status {
        self.inner.status.load()
    }

    /// Advisory: the control stream may end right after this returns true.
    pub fn is_alive(&self) -> bool {
        !self.status().is_terminal()
    }

    /// Marks the session unusable without waiting for the control stream.
    pub fn invalidate(&self) {
        if self.inner.status.set_closed() != Status::Closed {
            debug!("Session {}: invalidated", self.inner.id);
        }
    }

    /// Tears the session down. Safe to call any number of times from any
    /// number of tasks; all of them observe the same outcome.
    pub async fn close(&self) -> DriverResult<()> {
        self.inner.closer.call(None).await
    }

    /// Like [`close`](Self::close), with `timeout` bounding the server-side
    /// delete when no delete timeout is configured.
    pub async fn close_within(&self, timeout: Duration) -> DriverResult<()> {
        self.inner.closer.call(Some(timeout)).await
    }

    /// True once teardown has been triggered by any path.
    pub fn is_closing(&self) -> bool {
        self.inner.closer.is_started()
    }
}

fn teardown(
    service: Arc<dyn SessionService>,
    session_id: String,
    status: Arc<AtomicStatus>,
    stream_token: CancellationToken,
    exited: Exited,
    delete_timeout: Option<Duration>,
    on_closed: Option<OnClosed>,
) -> Teardown {
    Box::new(move |caller_timeout| {
        Box::pin(async move {
            stream_token.cancel();
            exited.wait().await;
            status.set_closing();

            let deleted = match delete_timeout.or(caller_timeout) {
                Some(limit) => tokio::time::timeout(limit, service.delete_session(&session_id))
                    .await
                    .unwrap_or(Err(DriverError::DeadlineExceeded)),
                None => service.delete_session(&session_id).await,
            };

            status.set_closed();
            if let Some(hook) = on_closed {
                hook(&session_id);
            }

            match &deleted {
                Ok(()) => debug!("Session {}: closed", session_id),
                Err(e) => warn!("Session {}: closed, server delete failed: {}", session_id, e),
            }
            deleted
        })
    })
}
