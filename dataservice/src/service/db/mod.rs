//! Database access
//!
//! Sessions over a single connection, driven through the [`core::driver`]
//! traits. MySQL is the production driver.

pub mod core;

pub use self::core::{
    command::DbCommand,
    config::{ServiceConfig, SessionConfig, COMMAND_TIMEOUT},
    driver::{DbConnection, DbConnector, DbReader, NonQueryOutcome},
    mysql::MySqlConnector,
    session::DbSession,
    types::{
        DataColumn, DataRow, DataTable, DbParameter, DbType, DbValue, IsolationLevel,
        ParameterDirection, ParameterValue, TableValue,
    },
};
