//! Maps a failed call onto retry and session-eviction decisions.

use crate::error::{DriverError, TransportErrorKind};
use crate::transport::protocol::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    Retriable,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionValidity {
    Valid,
    Invalid,
}

/// Which backoff schedule a retriable failure waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    /// Retry right away, typically on a fresh session
    None,
    Fast,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retryability: Retryability,
    pub session: SessionValidity,
    pub backoff: BackoffKind,
}

impl Classification {
    const fn fatal() -> Self {
        Self {
            retryability: Retryability::Fatal,
            session: SessionValidity::Valid,
            backoff: BackoffKind::None,
        }
    }

    const fn retriable(backoff: BackoffKind) -> Self {
        Self {
            retryability: Retryability::Retriable,
            session: SessionValidity::Valid,
            backoff,
        }
    }

    const fn session_invalid() -> Self {
        Self {
            retryability: Retryability::Retriable,
            session: SessionValidity::Invalid,
            backoff: BackoffKind::None,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retryability == Retryability::Retriable
    }

    pub fn invalidates_session(&self) -> bool {
        self.session == SessionValidity::Invalid
    }
}

/// Classifies a failure. Capture-point wrappers are looked through, so
/// tracing an error never changes its class.
pub fn classify(err: &DriverError) -> Classification {
    match err.root() {
        DriverError::Transport { kind, .. } => match kind {
            TransportErrorKind::Unavailable | TransportErrorKind::DeadlineExceeded => {
                Classification::retriable(BackoffKind::Fast)
            }
            TransportErrorKind::ResourceExhausted => Classification::retriable(BackoffKind::Slow),
            TransportErrorKind::Canceled | TransportErrorKind::Other => Classification::fatal(),
        },
        DriverError::Operation { status, .. } => classify_status(*status),
        DriverError::Construction { source, .. } => classify(source),
        DriverError::RetryStopped { cause, .. } => classify(cause),
        _ => Classification::fatal(),
    }
}

fn classify_status(status: StatusCode) -> Classification {
    match status {
        StatusCode::BadSession | StatusCode::SessionExpired => Classification::session_invalid(),
        StatusCode::SessionBusy => Classification {
            retryability: Retryability::Retriable,
            session: SessionValidity::Invalid,
            backoff: BackoffKind::Fast,
        },
        StatusCode::Aborted | StatusCode::Unavailable | StatusCode::Undetermined => {
            Classification::retriable(BackoffKind::Fast)
        }
        StatusCode::Overloaded => Classification::retriable(BackoffKind::Slow),
        _ => Classification::fatal(),
    }
}

/// True when the error means the session handle must never be reused.
pub fn must_evict_session(err: &DriverError) -> bool {
    classify(err).invalidates_session()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_retriable() {
        let c = classify(&DriverError::unavailable("refused"));
        assert!(c.is_retriable());
        assert_eq!(c.backoff, BackoffKind::Fast);
        assert!(!c.invalidates_session());

        let c = classify(&DriverError::transport_deadline("slow"));
        assert!(c.is_retriable());
    }

    #[test]
    fn test_canceled_transport_is_fatal() {
        let err = DriverError::Transport {
            kind: TransportErrorKind::Canceled,
            message: "dropped".to_string(),
        };
        assert!(!classify(&err).is_retriable());
    }

    #[test]
    fn test_bad_session_invalidates() {
        let err = DriverError::operation(StatusCode::BadSession, "unknown session");
        let c = classify(&err);
        assert!(c.invalidates_session());
        assert!(c.is_retriable());
        assert!(must_evict_session(&err.traced()));
    }

    #[test]
    fn test_overloaded_uses_slow_backoff() {
        let c = classify(&DriverError::operation(StatusCode::Overloaded, "busy"));
        assert!(c.is_retriable());
        assert_eq!(c.backoff, BackoffKind::Slow);
    }

    #[test]
    fn test_server_failures_are_fatal() {
        for status in [
            StatusCode::SchemeError,
            StatusCode::NotFound,
            StatusCode::GenericError,
            StatusCode::BadRequest,
            StatusCode::PreconditionFailed,
            StatusCode::Unauthorized,
        ] {
            let c = classify(&DriverError::operation(status, "nope"));
            assert!(!c.is_retriable(), "{} should be fatal", status);
            assert!(!c.invalidates_session());
        }
    }

    #[test]
    fn test_local_errors_are_fatal() {
        assert!(!classify(&DriverError::Canceled).is_retriable());
        assert!(!classify(&DriverError::NotInitialized).is_retriable());
        assert!(!classify(&DriverError::ProtocolError("bad frame".into())).is_retriable());
    }

    #[test]
    fn test_wrappers_do_not_change_class() {
        let plain = DriverError::operation(StatusCode::Aborted, "tli");
        let wrapped = plain
            .clone()
            .traced()
            .at_attempt(2, std::panic::Location::caller());
        assert_eq!(classify(&plain), classify(&wrapped));
    }
}
