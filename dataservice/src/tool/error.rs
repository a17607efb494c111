//! Data service error management
//!
//! Every failure raised by the data-access layer is expressed as an [`AppError`].
//! Boundary layers map these to transport-specific responses.

use thiserror::Error;
use tracing::{error, warn, Span};

/// Common application error
///
/// Driver failures are converted into the database variants; the retrieval
/// service wraps any failure of its stored procedure call in
/// [`AppError::StoredProcedure`] while keeping the original as `source`.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    // Input validation
    #[error("{0}")]
    InvalidInput(String),

    // Session misuse (command not created, connection not open, ...)
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    // Database
    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    #[error("Database query failed: {0}")]
    DatabaseQuery(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("An error has occurred executing the following stored proc : {procedure}, error: {source}")]
    StoredProcedure {
        procedure: String,
        #[source]
        source: Box<AppError>,
    },

    // System
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Wrap `source` as a failure of the stored procedure `procedure`.
    pub fn stored_procedure(procedure: &str, source: AppError) -> Self {
        AppError::StoredProcedure {
            procedure: procedure.to_string(),
            source: Box::new(source),
        }
    }

    /// Returns the severity of the error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Critical: the store is unreachable
            AppError::DatabaseConnection(_) | AppError::Configuration(_) => {
                ErrorSeverity::Critical
            }

            // High: the call reached the store and failed
            AppError::DatabaseQuery(_)
            | AppError::TransactionFailed(_)
            | AppError::Timeout(_)
            | AppError::InternalError(_) => ErrorSeverity::High,

            AppError::StoredProcedure { source, .. } => source.severity(),

            // Medium: caller mistakes
            AppError::InvalidInput(_) | AppError::InvalidState(_) => ErrorSeverity::Medium,
        }
    }

    /// True when the error stems from caller-supplied input rather than the store.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            AppError::InvalidInput(_) => true,
            AppError::StoredProcedure { source, .. } => source.is_invalid_input(),
            _ => false,
        }
    }

    /// Logs the error at a level matching its severity.
    pub fn log(&self, context: &str) {
        let error_msg = self.to_string();

        match self.severity() {
            ErrorSeverity::Critical => error!("[CRITICAL] {} - {}", context, error_msg),
            ErrorSeverity::High => error!("[HIGH] {} - {}", context, error_msg),
            ErrorSeverity::Medium => warn!("[MEDIUM] {} - {}", context, error_msg),
        }
    }

    /// [`log`](Self::log) with `span` as the event's parent.
    pub fn log_in(&self, span: &Span, context: &str) {
        span.in_scope(|| self.log(context));
    }
}

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorSeverity {
    Critical,
    High,
    Medium,
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => AppError::DatabaseQuery(db_err.to_string()),
            sqlx::Error::Io(io_err) => AppError::DatabaseConnection(io_err.to_string()),
            sqlx::Error::Tls(tls_err) => AppError::DatabaseConnection(tls_err.to_string()),
            sqlx::Error::PoolTimedOut => {
                AppError::Timeout("Database connection timeout".to_string())
            }
            sqlx::Error::Configuration(cfg_err) => AppError::Configuration(cfg_err.to_string()),
            _ => AppError::DatabaseQuery(err.to_string()),
        }
    }
}

/// Helpers for converting driver errors
pub mod helpers {
    use super::*;

    /// Converts a SQLx error into an [`AppError`], prefixing the message with `context`.
    ///
    /// Does not log; the caller that handles the error decides.
    pub fn map_sqlx_error(error: sqlx::Error, context: &str) -> AppError {
        match error {
            sqlx::Error::Database(db_err) => {
                AppError::DatabaseQuery(format!("{}: {}", context, db_err))
            }
            sqlx::Error::Io(io_err) => {
                AppError::DatabaseConnection(format!("{}: {}", context, io_err))
            }
            sqlx::Error::Protocol(proto_err) => {
                AppError::DatabaseConnection(format!("{}: {}", context, proto_err))
            }
            sqlx::Error::ColumnNotFound(column) => {
                AppError::DatabaseQuery(format!("{}: column '{}' not found", context, column))
            }
            sqlx::Error::ColumnDecode { index, source } => AppError::DatabaseQuery(format!(
                "{}: failed to decode column {}: {}",
                context, index, source
            )),
            _ => AppError::DatabaseQuery(format!("{}: {}", context, error)),
        }
    }
}
