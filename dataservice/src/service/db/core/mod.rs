//! Core data-access modules
//!
//! Driver seam, session lifecycle, command and value types.

pub mod command;
pub mod config;
pub mod driver;
pub mod mysql;
pub mod session;
pub mod types;

pub use command::DbCommand;
pub use config::{ServiceConfig, SessionConfig, COMMAND_TIMEOUT};
pub use driver::{DbConnection, DbConnector, DbReader, NonQueryOutcome};
pub use mysql::MySqlConnector;
pub use session::DbSession;
pub use types::*;
