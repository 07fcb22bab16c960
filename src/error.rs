use std::fmt;
use std::panic::Location;

use thiserror::Error;

use crate::transport::protocol::{Issue, StatusCode};

/// Kind of a transport-level failure, independent of any server status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The endpoint could not be reached or the connection broke.
    Unavailable,
    /// The call did not complete within its operation timeout.
    DeadlineExceeded,
    /// The call was abandoned locally.
    Canceled,
    /// The transport refused the call for lack of resources.
    ResourceExhausted,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Unavailable => write!(f, "unavailable"),
            TransportErrorKind::DeadlineExceeded => write!(f, "deadline exceeded"),
            TransportErrorKind::Canceled => write!(f, "canceled"),
            TransportErrorKind::ResourceExhausted => write!(f, "resource exhausted"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("Operation failed with status {status}{}", format_issues(.issues))]
    Operation {
        status: StatusCode,
        issues: Vec<Issue>,
    },

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Message too large")]
    MessageTooLarge,

    #[error("Client is not initialized")]
    NotInitialized,

    #[error("Client is closed")]
    ClientClosed,

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Attach failed and the orphaned server handle could not be deleted either.
    #[error("Session '{session_id}' construction failed: {source}; cleanup also failed: {cleanup}")]
    Construction {
        session_id: String,
        source: Box<DriverError>,
        cleanup: Box<DriverError>,
    },

    #[error("{source} (attempt {attempt} at {location})")]
    Attempt {
        attempt: u32,
        location: &'static Location<'static>,
        source: Box<DriverError>,
    },

    #[error("{source} (at {location})")]
    Traced {
        location: &'static Location<'static>,
        source: Box<DriverError>,
    },

    #[error("Retry stopped after {attempts} attempt(s): {cause}; last error: {last}")]
    RetryStopped {
        attempts: u32,
        cause: Box<DriverError>,
        last: Box<DriverError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

fn format_issues(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return String::new();
    }
    let joined = issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!(": {}", joined)
}

impl DriverError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        DriverError::Transport {
            kind: TransportErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn transport_deadline(message: impl Into<String>) -> Self {
        DriverError::Transport {
            kind: TransportErrorKind::DeadlineExceeded,
            message: message.into(),
        }
    }

    pub fn operation(status: StatusCode, message: impl Into<String>) -> Self {
        DriverError::Operation {
            status,
            issues: vec![Issue::new(message)],
        }
    }

    /// Records the caller's location. An error that already carries a
    /// capture point is returned as is.
    #[track_caller]
    pub fn traced(self) -> Self {
        match self {
            DriverError::Traced { .. } | DriverError::Attempt { .. } => self,
            other => DriverError::Traced {
                location: Location::caller(),
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn at_attempt(self, attempt: u32, location: &'static Location<'static>) -> Self {
        let inner = match self {
            DriverError::Traced { source, .. } => *source,
            other => other,
        };
        DriverError::Attempt {
            attempt,
            location,
            source: Box::new(inner),
        }
    }

    /// The error with every capture-point wrapper removed.
    pub fn root(&self) -> &DriverError {
        match self {
            DriverError::Traced { source, .. } | DriverError::Attempt { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// The server status carried by the error, if the server reported one.
    pub fn status(&self) -> Option<StatusCode> {
        match self.root() {
            DriverError::Operation { status, .. } => Some(*status),
            DriverError::Construction { source, .. } => source.status(),
            DriverError::RetryStopped { last, .. } => last.status(),
            _ => None,
        }
    }

    pub fn is_operation_error(&self, status: StatusCode) -> bool {
        self.status() == Some(status)
    }

    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self.root() {
            DriverError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Wraps a result's error with the caller's location.
pub(crate) trait ResultExt<T> {
    fn traced(self) -> DriverResult<T>;
}

impl<T> ResultExt<T> for DriverResult<T> {
    #[track_caller]
    fn traced(self) -> DriverResult<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.traced()),
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::TimedOut => DriverError::transport_deadline(e.to_string()),
            _ => DriverError::unavailable(e.to_string()),
        }
    }
}
