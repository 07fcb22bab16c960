use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::error::{DriverError, DriverResult};

/// Teardown action. Receives the caller's time budget for the server-side
/// delete when the caller has one.
pub(crate) type Teardown =
    Box<dyn FnOnce(Option<Duration>) -> BoxFuture<'static, DriverResult<()>> + Send>;

enum State {
    Armed(Teardown),
    Started,
}

/// Runs a session's teardown at most once.
///
/// The first caller spawns the teardown as its own task, so abandoning that
/// caller never leaves teardown half done. Every caller, first or later,
/// waits for the same cached outcome.
pub(crate) struct CloseOnce {
    state: Mutex<State>,
    outcome: watch::Sender<Option<DriverResult<()>>>,
}

impl CloseOnce {
    pub(crate) fn new(teardown: Teardown) -> Self {
        Self {
            state: Mutex::new(State::Armed(teardown)),
            outcome: watch::channel(None).0,
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            State::Started
        )
    }

    pub(crate) async fn call(&self, timeout: Option<Duration>) -> DriverResult<()> {
        let teardown = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match std::mem::replace(&mut *state, State::Started) {
                State::Armed(teardown) => Some(teardown),
                State::Started => None,
            }
        };

        // Subscribe before spawning so the outcome cannot be missed.
        let mut rx = self.outcome.subscribe();

        if let Some(teardown) = teardown {
            let outcome = self.outcome.clone();
            let task = tokio::spawn(teardown(timeout));
            tokio::spawn(async move {
                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => Err(DriverError::Internal(format!(
                        "Session teardown task failed: {}",
                        e
                    ))),
                };
                outcome.send_replace(Some(result));
            });
        }

        let outcome = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map_err(|e| DriverError::Internal(format!("Session teardown lost: {}", e)))?;

        match &*outcome {
            Some(result) => result.clone(),
            None => Err(DriverError::Internal(
                "Session teardown finished without an outcome".to_string(),
            )),
        }
    }
}
