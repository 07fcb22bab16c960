use std::time::Duration;

use crate::retry::Backoff;

const ENV_PREFIX: &str = "SOLIDB_SQL_";

/// Retry budget and backoff schedules shared by every retried call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    pub fast: Backoff,
    pub slow: Backoff,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            fast: Backoff::fast(),
            slow: Backoff::slow(),
        }
    }
}

/// Client configuration for the query and coordination clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Run administrative calls through the retry loop
    pub auto_retry: bool,
    /// Server-side limit sent with administrative calls; also bounds every
    /// unary transport exchange
    pub operation_timeout: Option<Duration>,
    /// Server-side cancel-after sent with administrative calls
    pub operation_cancel_after: Option<Duration>,
    /// Overall bound on one retried call, every attempt included
    pub call_timeout: Option<Duration>,
    /// Bound on session allocation plus attach
    pub session_create_timeout: Option<Duration>,
    /// Bound on the server-side delete during teardown. When unset the
    /// caller's own deadline applies.
    pub session_delete_timeout: Option<Duration>,
    pub retry: RetrySettings,
    /// Pooled connections of the TCP transport
    pub pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_retry: true,
            operation_timeout: None,
            operation_cancel_after: None,
            call_timeout: None,
            session_create_timeout: Some(Duration::from_secs(5)),
            session_delete_timeout: Some(Duration::from_millis(500)),
            retry: RetrySettings::default(),
            pool_size: 4,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `SOLIDB_SQL_*` variables on top of the defaults:
    /// `AUTO_RETRY`, `OPERATION_TIMEOUT_MS`, `OPERATION_CANCEL_AFTER_MS`,
    /// `CALL_TIMEOUT_MS`, `SESSION_CREATE_TIMEOUT_MS`, `SESSION_DELETE_TIMEOUT_MS`,
    /// `RETRY_MAX_ATTEMPTS`, `POOL_SIZE`. A duration of `0` unsets the limit.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("AUTO_RETRY").and_then(|v| parse_bool(&v)) {
            config.auto_retry = v;
        }
        if let Some(v) = lookup("OPERATION_TIMEOUT_MS").and_then(|v| parse_millis(&v)) {
            config.operation_timeout = v;
        }
        if let Some(v) = lookup("OPERATION_CANCEL_AFTER_MS").and_then(|v| parse_millis(&v)) {
            config.operation_cancel_after = v;
        }
        if let Some(v) = lookup("CALL_TIMEOUT_MS").and_then(|v| parse_millis(&v)) {
            config.call_timeout = v;
        }
        if let Some(v) = lookup("SESSION_CREATE_TIMEOUT_MS").and_then(|v| parse_millis(&v)) {
            config.session_create_timeout = v;
        }
        if let Some(v) = lookup("SESSION_DELETE_TIMEOUT_MS").and_then(|v| parse_millis(&v)) {
            config.session_delete_timeout = v;
        }
        if let Some(v) = lookup("RETRY_MAX_ATTEMPTS").and_then(|v| v.trim().parse::<u32>().ok()) {
            config.retry.max_attempts = v.max(1);
        }
        if let Some(v) = lookup("POOL_SIZE").and_then(|v| v.trim().parse::<usize>().ok()) {
            config.pool_size = v.max(1);
        }

        config
    }

    pub fn with_auto_retry(mut self, enabled: bool) -> Self {
        self.auto_retry = enabled;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn with_operation_cancel_after(mut self, cancel_after: Duration) -> Self {
        self.operation_cancel_after = Some(cancel_after);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_session_create_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_create_timeout = timeout;
        self
    }

    pub fn with_session_delete_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_delete_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!("Ignoring invalid boolean value '{}'", other);
            None
        }
    }
}

fn parse_millis(value: &str) -> Option<Option<Duration>> {
    match value.trim().parse::<u64>() {
        Ok(0) => Some(None),
        Ok(ms) => Some(Some(Duration::from_millis(ms))),
        Err(_) => {
            tracing::warn!("Ignoring invalid duration value '{}'", value);
            None
        }
    }
}
