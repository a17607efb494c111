//! MySQL / MariaDB connection configuration
//!
//! Reads the connection settings from the `.env` file (current or parent
//! directory) or from the process environment. Missing values fall back to
//! defaults; an unparsable value is a configuration error.

use crate::tool::error::AppError;
use dotenv::dotenv;
use sqlx::mysql::MySqlConnectOptions;
use std::env;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Database connection settings
#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    password: String,
    pub database: String,
    pub connect_timeout: Duration,
}

impl DbConfig {
    /// Builds a configuration from explicit values.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Loads the configuration from the environment.
    ///
    /// Recognised variables: `db_host`, `db_port`, `db_id`, `db_password`,
    /// `db_name`, `db_connect_timeout_secs`.
    pub fn from_env() -> Result<Self, AppError> {
        load_env_file();

        let host = env::var("db_host").unwrap_or_else(|_| {
            warn!("db_host not set, using localhost");
            "localhost".to_string()
        });

        let port = match env::var("db_port") {
            Ok(value) => value.parse::<u16>().map_err(|e| {
                AppError::Configuration(format!("db_port must be a port number: {}", e))
            })?,
            Err(_) => {
                warn!("db_port not set, using 3306");
                3306
            }
        };

        let user = env::var("db_id").unwrap_or_else(|_| {
            warn!("db_id not set, using root");
            "root".to_string()
        });

        let password = env::var("db_password").unwrap_or_else(|_| {
            error!("db_password is required");
            String::new()
        });

        let database = env::var("db_name").unwrap_or_else(|_| {
            warn!("db_name not set, using insiten");
            "insiten".to_string()
        });

        let connect_timeout = match env::var("db_connect_timeout_secs") {
            Ok(value) => Duration::from_secs(value.parse::<u64>().map_err(|e| {
                AppError::Configuration(format!("db_connect_timeout_secs must be seconds: {}", e))
            })?),
            Err(_) => Duration::from_secs(10),
        };

        info!("Database target: {}:{}@{}:{}/{}", user, "***", host, port, database);

        Ok(Self {
            host,
            port,
            user,
            password,
            database,
            connect_timeout,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connection options for a single physical connection.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Loads `.env` from the working directory, falling back to its parent
/// (binaries run from inside the member crate).
pub fn load_env_file() {
    let current_dir = env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let workspace_env = current_dir.join(".env");
    let parent_env = current_dir.parent().map(|p| p.join(".env"));

    if workspace_env.exists() {
        dotenv::from_path(&workspace_env).ok();
        info!("Loaded environment file: {:?}", workspace_env);
    } else if let Some(parent_env) = parent_env.filter(|p| p.exists()) {
        dotenv::from_path(&parent_env).ok();
        info!("Loaded environment file: {:?}", parent_env);
    } else if dotenv().is_err() {
        warn!(".env file not found, using process environment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_masks_password() {
        let config = DbConfig::new("db.internal", 3307, "reader", "s3cret", "insiten");
        let printed = format!("{:?}", config);

        assert!(printed.contains("db.internal"));
        assert!(!printed.contains("s3cret"));
    }

    #[test]
    fn explicit_config_defaults_connect_timeout() {
        let config = DbConfig::new("localhost", 3306, "root", "", "insiten");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));

        let config = config.with_connect_timeout(Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
    }
}
