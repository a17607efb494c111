//! Driver seam
//!
//! The session talks to the store only through these traits, so the same
//! lifecycle code runs against MySQL in production and in-memory drivers in
//! tests.

use crate::service::db::core::types::{DataColumn, DataRow, DbValue, IsolationLevel};
use crate::service::db::core::command::DbCommand;
use crate::tool::error::AppError;
use async_trait::async_trait;

/// Opens physical connections.
#[async_trait]
pub trait DbConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DbConnection>, AppError>;
}

/// One physical connection.
#[async_trait]
pub trait DbConnection: Send {
    fn is_open(&self) -> bool;

    async fn begin_transaction(&mut self, level: IsolationLevel) -> Result<(), AppError>;

    async fn commit(&mut self) -> Result<(), AppError>;

    async fn rollback(&mut self) -> Result<(), AppError>;

    /// Runs the command without a result set.
    async fn execute_non_query(&mut self, command: &DbCommand) -> Result<NonQueryOutcome, AppError>;

    /// Runs the command and returns a cursor over its first result set.
    async fn execute_reader<'c>(
        &'c mut self,
        command: &'c DbCommand,
    ) -> Result<Box<dyn DbReader + 'c>, AppError>;

    async fn close(self: Box<Self>) -> Result<(), AppError>;
}

/// Forward-only cursor over a result set.
#[async_trait]
pub trait DbReader: Send {
    /// Schema of the result set. Drivers that learn the schema from the rows
    /// themselves return an empty slice until the first row has been read.
    fn columns(&self) -> &[DataColumn];

    async fn next_row(&mut self) -> Result<Option<DataRow>, AppError>;

    /// Discards unread rows and releases the cursor.
    async fn close(self: Box<Self>) -> Result<(), AppError>;
}

/// Result of a non-query execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NonQueryOutcome {
    pub rows_affected: u64,
    /// Values of output / input-output / return-value parameters, by name
    pub outputs: Vec<(String, DbValue)>,
}
