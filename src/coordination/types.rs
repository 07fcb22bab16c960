use std::time::Duration;

pub use crate::transport::protocol::{
    ConsistencyMode, EntryType, NodeConfig, OperationMode, OperationParams,
    RatelimiterCountersMode, SchemeEntry,
};

const DEFAULT_DESCRIPTION: &str = "SoliDB SQL driver";

/// Settings of a coordination session. There is no client keep-alive or
/// reconnect setting: a session whose control stream ends is dead, and the
/// server holds it for `session_timeout` at most.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionOptions {
    /// Free-form text shown to operators inspecting the node
    pub description: String,
    /// How long the server keeps the session after its control stream drops
    pub session_timeout: Duration,
    /// Bound on allocation plus attach
    pub start_timeout: Duration,
    /// Bound on the server-side delete during teardown
    pub stop_timeout: Duration,
}

impl Default for CreateSessionOptions {
    fn default() -> Self {
        Self {
            description: DEFAULT_DESCRIPTION.to_string(),
            session_timeout: Duration::from_secs(5),
            start_timeout: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(1),
        }
    }
}

impl CreateSessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_session_defaults() {
        let options = CreateSessionOptions::default();
        assert_eq!(options.description, "SoliDB SQL driver");
        assert_eq!(options.session_timeout, Duration::from_secs(5));
        assert_eq!(options.start_timeout, Duration::from_secs(1));
        assert_eq!(options.stop_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_create_session_builder() {
        let options = CreateSessionOptions::new()
            .with_description("lock service")
            .with_session_timeout(Duration::from_secs(30))
            .with_stop_timeout(Duration::from_millis(200));

        assert_eq!(options.description, "lock service");
        assert_eq!(options.session_timeout, Duration::from_secs(30));
        assert_eq!(options.start_timeout, Duration::from_secs(1));
        assert_eq!(options.stop_timeout, Duration::from_millis(200));
    }
}
