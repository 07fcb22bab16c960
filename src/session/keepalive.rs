//! Control-stream keepalive.
//!
//! The attach stream is the only liveness signal a session has. The first
//! message confirms the attach; afterwards a worker drains the stream until
//! it ends or fails, then fires the session's closer.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::closer::CloseOnce;
use crate::error::{DriverError, DriverResult};
use crate::transport::{AttachStream, SessionService};

/// Opens the control stream and waits for the server's confirmation.
pub(crate) async fn attach(
    service: &dyn SessionService,
    session_id: &str,
) -> DriverResult<AttachStream> {
    let mut stream = service.attach_session(session_id).await?;

    match stream.next().await {
        Some(Ok(state)) if state.status.is_success() => {
            debug!("Session {}: attach confirmed", session_id);
            Ok(stream)
        }
        Some(Ok(state)) => Err(DriverError::Operation {
            status: state.status,
            issues: state.issues,
        }),
        Some(Err(e)) => Err(e),
        None => Err(DriverError::unavailable(format!(
            "control stream of session '{}' ended before attach confirmation",
            session_id
        ))),
    }
}

/// Completion signal of a keepalive worker.
#[derive(Clone)]
pub(crate) struct Exited(watch::Receiver<bool>);

impl Exited {
    pub(crate) fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// Resolves once the worker has left its receive loop.
    pub(crate) async fn wait(mut self) {
        // A dropped sender means the worker is gone as well.
        let _ = self.0.wait_for(|exited| *exited).await;
    }
}

/// Drains `stream` until it terminates or `token` is cancelled, then
/// signals `exited` and runs the closer.
pub(crate) fn spawn(
    session_id: String,
    mut stream: AttachStream,
    token: CancellationToken,
    exited: watch::Sender<bool>,
    closer: Arc<CloseOnce>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Session {}: control stream released", session_id);
                    break;
                }
                message = stream.next() => match message {
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("Session {}: control stream failed: {}", session_id, e);
                        break;
                    }
                    None => {
                        debug!("Session {}: control stream closed by server", session_id);
                        break;
                    }
                },
            }
        }

        drop(stream);
        exited.send_replace(true);

        if let Err(e) = closer.call(None).await {
            debug!("Session {}: teardown after stream end failed: {}", session_id, e);
        }
    })
}
