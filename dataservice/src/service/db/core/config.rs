//! Session and service settings

use std::time::Duration;

/// Timeout applied to every command execution.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Execution timeout for every command
    pub command_timeout: Duration,

    /// Executions slower than this are logged at warn (ms)
    pub slow_query_threshold_ms: u64,

    /// Log procedure names and parameters at debug
    pub enable_query_logging: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: COMMAND_TIMEOUT,
            slow_query_threshold_ms: 1000,
            enable_query_logging: true,
        }
    }
}

impl SessionConfig {
    /// Load settings from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("db_slow_query_ms") {
            if let Ok(ms) = val.parse() {
                config.slow_query_threshold_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("db_query_logging") {
            if let Ok(flag) = val.parse() {
                config.enable_query_logging = flag;
            }
        }

        config
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Retrieval service settings
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub session: SessionConfig,

    /// Run retrieval inside a read-uncommitted transaction. Reads may then
    /// observe uncommitted writes; the transaction is rolled back on close.
    pub read_uncommitted: bool,
}

impl ServiceConfig {
    /// Load settings from the environment
    pub fn from_env() -> Self {
        let read_uncommitted = std::env::var("db_read_uncommitted")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(false);

        Self {
            session: SessionConfig::from_env(),
            read_uncommitted,
        }
    }

    pub fn with_read_uncommitted(mut self, enabled: bool) -> Self {
        self.read_uncommitted = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_thirty_seconds() {
        let config = SessionConfig::default();
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert!(!ServiceConfig::default().read_uncommitted);
    }
}
