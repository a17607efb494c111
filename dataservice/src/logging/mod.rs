//! Logging setup
//!
//! Events are emitted with `tracing`; components receive the span they log
//! under at construction time instead of reaching for a global logger. This
//! module only installs the process-wide subscriber for binaries.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub default_directive: String,

    /// Include the event target (module path)
    pub with_target: bool,

    /// Colored output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Load settings from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LOG_LEVEL") {
            if !val.trim().is_empty() {
                config.default_directive = val;
            }
        }

        if let Ok(val) = std::env::var("LOG_WITH_TARGET") {
            if let Ok(flag) = val.parse() {
                config.with_target = flag;
            }
        }

        if let Ok(val) = std::env::var("LOG_ANSI") {
            if let Ok(flag) = val.parse() {
                config.ansi = flag;
            }
        }

        config
    }
}

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive`. Calling this twice
/// returns an error from the second call.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.default_directive)
            .map_err(|e| anyhow::anyhow!("invalid log directive '{}': {e}", config.default_directive))?,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_logs_info() {
        let config = LoggingConfig::default();
        assert_eq!(config.default_directive, "info");
        assert!(config.with_target);
    }
}
