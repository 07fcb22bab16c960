//! Retry orchestration for idempotent remote calls.
//!
//! [`retry`] re-drives a unit of work while its failures classify as
//! retriable, the caller asserted idempotency, the attempt budget lasts and
//! neither the deadline nor the cancel token has fired. Every returned error
//! carries the attempt number and the location `retry` was called from.

pub mod backoff;
pub mod classify;

pub use backoff::Backoff;
pub use classify::{
    classify, must_evict_session, BackoffKind, Classification, Retryability, SessionValidity,
};

use std::future::Future;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RetrySettings;
use crate::error::{DriverError, DriverResult};

/// Observable steps of a retry loop
#[derive(Debug)]
pub enum RetryEvent<'a> {
    Attempt {
        label: &'a str,
        attempt: u32,
    },
    Failed {
        label: &'a str,
        attempt: u32,
        error: &'a DriverError,
        classification: Classification,
        will_retry: bool,
    },
    Finished {
        label: &'a str,
        attempts: u32,
        succeeded: bool,
    },
}

pub type RetryTrace = Arc<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

/// Per-call retry policy. Built fresh for every call.
#[derive(Clone)]
pub struct RetryOptions {
    label: String,
    idempotent: bool,
    max_attempts: u32,
    fast: Backoff,
    slow: Backoff,
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
    trace: Option<RetryTrace>,
}

impl std::fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("label", &self.label)
            .field("idempotent", &self.idempotent)
            .field("max_attempts", &self.max_attempts)
            .field("deadline", &self.deadline)
            .field("has_trace", &self.trace.is_some())
            .finish()
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            label: String::new(),
            idempotent: false,
            max_attempts: settings.max_attempts.max(1),
            fast: settings.fast,
            slow: settings.slow,
            deadline: None,
            cancel: None,
            trace: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Declares that re-running the operation after a partial failure
    /// cannot produce a duplicate effect. Without it nothing is retried.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, fast: Backoff, slow: Backoff) -> Self {
        self.fast = fast;
        self.slow = slow;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn trace<F>(mut self, trace: F) -> Self
    where
        F: Fn(&RetryEvent<'_>) + Send + Sync + 'static,
    {
        self.trace = Some(Arc::new(trace));
        self
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn emit(&self, event: RetryEvent<'_>) {
        if let Some(trace) = &self.trace {
            trace(&event);
        }
    }

    fn stop_cause(&self) -> Option<DriverError> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Some(DriverError::Canceled);
        }
        if self.deadline.is_some_and(|at| Instant::now() >= at) {
            return Some(DriverError::DeadlineExceeded);
        }
        None
    }

    /// Resolves once the cancel token fires or the deadline passes.
    async fn interrupted(&self) -> DriverError {
        match (&self.cancel, self.deadline) {
            (Some(token), Some(at)) => tokio::select! {
                _ = token.cancelled() => DriverError::Canceled,
                _ = tokio::time::sleep_until(at) => DriverError::DeadlineExceeded,
            },
            (Some(token), None) => {
                token.cancelled().await;
                DriverError::Canceled
            }
            (None, Some(at)) => {
                tokio::time::sleep_until(at).await;
                DriverError::DeadlineExceeded
            }
            (None, None) => std::future::pending().await,
        }
    }

    fn delay(&self, kind: BackoffKind, attempt: u32) -> Duration {
        match kind {
            BackoffKind::None => Duration::ZERO,
            BackoffKind::Fast => self.fast.delay(attempt),
            BackoffKind::Slow => self.slow.delay(attempt),
        }
    }
}

fn stopped(attempts: u32, cause: DriverError, last: Option<DriverError>) -> DriverError {
    match last {
        Some(last) => DriverError::RetryStopped {
            attempts,
            cause: Box::new(cause),
            last: Box::new(last),
        },
        None => cause,
    }
}

/// Runs `op` until it succeeds or a stop condition holds. `op` receives the
/// 1-based attempt number.
#[track_caller]
pub fn retry<'a, T, F, Fut>(
    options: &'a RetryOptions,
    op: F,
) -> impl Future<Output = DriverResult<T>> + 'a
where
    F: FnMut(u32) -> Fut + 'a,
    Fut: Future<Output = DriverResult<T>> + 'a,
    T: 'a,
{
    retry_at(options, op, Location::caller())
}

/// [`retry`] with an explicit capture point, for wrappers that track their
/// own caller.
pub(crate) async fn retry_at<T, F, Fut>(
    options: &RetryOptions,
    mut op: F,
    location: &'static Location<'static>,
) -> DriverResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DriverResult<T>>,
{
    let label = options.label.as_str();
    let mut attempt = 0u32;
    let mut last: Option<DriverError> = None;

    loop {
        if let Some(cause) = options.stop_cause() {
            options.emit(RetryEvent::Finished {
                label,
                attempts: attempt,
                succeeded: false,
            });
            return Err(stopped(attempt, cause, last));
        }

        attempt += 1;
        options.emit(RetryEvent::Attempt { label, attempt });

        let outcome = tokio::select! {
            biased;
            cause = options.interrupted() => {
                debug!("Retry {}: attempt {} interrupted: {}", label, attempt, cause);
                options.emit(RetryEvent::Finished {
                    label,
                    attempts: attempt,
                    succeeded: false,
                });
                return Err(stopped(attempt, cause, last));
            }
            result = op(attempt) => result,
        };

        let err = match outcome {
            Ok(value) => {
                options.emit(RetryEvent::Finished {
                    label,
                    attempts: attempt,
                    succeeded: true,
                });
                return Ok(value);
            }
            Err(e) => e.at_attempt(attempt, location),
        };

        let classification = classify(&err);
        let will_retry = classification.is_retriable()
            && options.idempotent
            && attempt < options.max_attempts;

        options.emit(RetryEvent::Failed {
            label,
            attempt,
            error: &err,
            classification,
            will_retry,
        });

        if !will_retry {
            debug!(
                "Retry {}: giving up after attempt {} (retriable: {}, idempotent: {}): {}",
                label,
                attempt,
                classification.is_retriable(),
                options.idempotent,
                err
            );
            options.emit(RetryEvent::Finished {
                label,
                attempts: attempt,
                succeeded: false,
            });
            return Err(err);
        }

        let delay = options.delay(classification.backoff, attempt);
        debug!(
            "Retry {}: attempt {} failed, retrying in {:?}: {}",
            label, attempt, delay, err
        );
        last = Some(err);

        if !delay.is_zero() {
            tokio::select! {
                biased;
                cause = options.interrupted() => {
                    options.emit(RetryEvent::Finished {
                        label,
                        attempts: attempt,
                        succeeded: false,
                    });
                    return Err(stopped(attempt, cause, last));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
