//! Database access session
//!
//! One session owns one physical connection, at most one transaction and at
//! most one command. It is created per logical operation and never shared
//! between concurrent calls.

use crate::service::db::core::command::DbCommand;
use crate::service::db::core::config::SessionConfig;
use crate::service::db::core::driver::{DbConnection, DbConnector, DbReader};
use crate::service::db::core::types::{DataTable, DbParameter, DbValue, IsolationLevel};
use crate::tool::error::AppError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn, Span};

pub struct DbSession {
    connector: Arc<dyn DbConnector>,
    config: SessionConfig,
    connection: Option<Box<dyn DbConnection>>,
    transaction: Option<IsolationLevel>,
    command: Option<DbCommand>,
    span: Span,
}

impl DbSession {
    /// Creates a session; nothing is opened until [`initialize_connection`](Self::initialize_connection).
    ///
    /// Events are recorded under `span`.
    pub fn new(connector: Arc<dyn DbConnector>, config: SessionConfig, span: Span) -> Self {
        Self {
            connector,
            config,
            connection: None,
            transaction: None,
            command: None,
            span,
        }
    }

    pub fn is_connection_open(&self) -> bool {
        self.connection.as_ref().map_or(false, |c| c.is_open())
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn command(&self) -> Option<&DbCommand> {
        self.command.as_ref()
    }

    /// Opens the connection if it is not already open.
    pub async fn initialize_connection(&mut self) -> Result<(), AppError> {
        if self.is_connection_open() {
            return Ok(());
        }

        // A connection the driver reports as closed carries no transaction.
        self.connection = None;
        self.transaction = None;

        let connection = self.connector.connect().await?;
        self.connection = Some(connection);
        debug!(parent: &self.span, "Connection opened");
        Ok(())
    }

    /// Begins a READ UNCOMMITTED transaction unless one is already active.
    ///
    /// Reads inside it may observe uncommitted writes of other sessions; the
    /// rows returned are not a consistent snapshot.
    pub async fn create_transaction(&mut self) -> Result<(), AppError> {
        if self.transaction.is_some() {
            return Ok(());
        }

        let level = IsolationLevel::ReadUncommitted;
        self.open_connection_mut()?.begin_transaction(level).await?;
        self.set_transaction(Some(level));
        debug!(parent: &self.span, isolation = level.as_str(), "Transaction started");
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> Result<(), AppError> {
        if self.transaction.is_none() {
            return Ok(());
        }

        self.open_connection_mut()?.commit().await?;
        self.set_transaction(None);
        debug!(parent: &self.span, "Transaction committed");
        Ok(())
    }

    pub async fn rollback_transaction(&mut self) -> Result<(), AppError> {
        if self.transaction.is_none() {
            return Ok(());
        }

        self.open_connection_mut()?.rollback().await?;
        self.set_transaction(None);
        debug!(parent: &self.span, "Transaction rolled back");
        Ok(())
    }

    /// Prepares a new stored-procedure command on the open connection,
    /// replacing any previous one. The active transaction, if any, is attached.
    pub fn create_command(&mut self) -> Result<(), AppError> {
        self.open_connection_mut()?;
        self.command = Some(DbCommand::new(self.config.command_timeout, self.transaction));
        Ok(())
    }

    /// Binds a parameter to the current command.
    pub fn add_parameter(&mut self, parameter: DbParameter) -> Result<(), AppError> {
        parameter.validate()?;
        self.command_mut()?.push_parameter(parameter);
        Ok(())
    }

    /// Removes all parameters and resets the command text.
    pub fn clear_parameters(&mut self) -> Result<(), AppError> {
        self.command_mut()?.clear();
        Ok(())
    }

    /// Value of an output parameter captured by the last [`exec_stored_proc`](Self::exec_stored_proc).
    pub fn output_parameter_value(&self, name: &str) -> Option<&DbValue> {
        self.command.as_ref()?.output_value(name)
    }

    /// Executes `proc_name` as a non-query and returns the affected-row count.
    pub async fn exec_stored_proc(&mut self, proc_name: &str) -> Result<u64, AppError> {
        let timeout = self.config.command_timeout;
        let started = Instant::now();

        let (connection, command) = self.prepare(proc_name)?;
        let outcome = tokio::time::timeout(timeout, connection.execute_non_query(command))
            .await
            .map_err(|_| timeout_error(proc_name, timeout))??;
        command.set_outputs(outcome.outputs);

        self.check_slow_query(proc_name, started);
        Ok(outcome.rows_affected)
    }

    /// Executes `proc_name` and returns a cursor over its rows.
    ///
    /// The caller owns the reader and must [`close`](DbReader::close) it.
    pub async fn get_data_reader(
        &mut self,
        proc_name: &str,
    ) -> Result<Box<dyn DbReader + '_>, AppError> {
        let timeout = self.config.command_timeout;

        let (connection, command) = self.prepare(proc_name)?;
        let command: &DbCommand = command;
        tokio::time::timeout(timeout, connection.execute_reader(command))
            .await
            .map_err(|_| timeout_error(proc_name, timeout))?
    }

    /// Executes `proc_name` and drains its rows into a table named
    /// `table_name` (the procedure name when absent).
    ///
    /// The connection is closed when this returns, whether the read
    /// succeeded or not. Opening stays with [`initialize_connection`](Self::initialize_connection).
    pub async fn get_data_table(
        &mut self,
        proc_name: &str,
        table_name: Option<&str>,
    ) -> Result<DataTable, AppError> {
        let started = Instant::now();
        let outcome = self.read_table(proc_name, table_name).await;

        if let Err(e) = self.close_connection().await {
            e.log_in(&self.span, "closing connection after read");
        }

        if let Ok(table) = &outcome {
            self.check_slow_query(proc_name, started);
            debug!(
                parent: &self.span,
                procedure = proc_name,
                table = table.name(),
                rows = table.row_count(),
                "Result table loaded"
            );
        }
        outcome
    }

    /// Disposes any active transaction (rolled back), then closes the connection.
    pub async fn close_connection(&mut self) -> Result<(), AppError> {
        let had_transaction = self.transaction.is_some();
        self.set_transaction(None);
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        if !connection.is_open() {
            return Ok(());
        }

        let mut result = Ok(());
        if had_transaction {
            result = connection.rollback().await;
        }

        let closed = connection.close().await;
        debug!(parent: &self.span, "Connection closed");
        result.and(closed)
    }

    pub fn dispose_command(&mut self) {
        if self.command.take().is_some() {
            debug!(parent: &self.span, "Command disposed");
        }
    }

    /// Runs `operation` on an open connection, then disposes the command and
    /// closes the connection whatever the outcome.
    ///
    /// The operation's error is returned as-is; cleanup failures are logged.
    pub async fn with_connection<T, F>(&mut self, operation: F) -> Result<T, AppError>
    where
        F: for<'s> FnOnce(
                &'s mut DbSession,
            ) -> Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 's>>
            + Send,
        T: Send,
    {
        let outcome = match self.initialize_connection().await {
            Ok(()) => operation(self).await,
            Err(e) => Err(e),
        };

        self.dispose_command();
        if let Err(e) = self.close_connection().await {
            e.log_in(&self.span, "session cleanup");
        }

        outcome
    }

    async fn read_table(
        &mut self,
        proc_name: &str,
        table_name: Option<&str>,
    ) -> Result<DataTable, AppError> {
        let mut table = DataTable::new(table_name.unwrap_or(proc_name));

        // The timeout covers execution; row fetches are bounded by the driver.
        let mut reader = self.get_data_reader(proc_name).await?;
        let loaded = table.load(reader.as_mut()).await;
        let closed = reader.close().await;
        loaded.and(closed)?;

        Ok(table)
    }

    /// Sets the command text and hands out the connection and command together.
    fn prepare(
        &mut self,
        proc_name: &str,
    ) -> Result<(&mut dyn DbConnection, &mut DbCommand), AppError> {
        let Self {
            command,
            connection,
            config,
            span,
            ..
        } = self;

        let command = command
            .as_mut()
            .ok_or_else(|| AppError::InvalidState("no command has been created".to_string()))?;
        let connection = match connection.as_deref_mut() {
            Some(connection) if connection.is_open() => connection,
            _ => return Err(AppError::InvalidState("connection is not open".to_string())),
        };

        command.set_text(proc_name);
        if config.enable_query_logging {
            debug!(
                parent: &*span,
                procedure = proc_name,
                params = ?command.parameters(),
                "Executing stored procedure"
            );
        }

        Ok((connection, command))
    }

    /// Records the active transaction on the session and its current command.
    fn set_transaction(&mut self, transaction: Option<IsolationLevel>) {
        self.transaction = transaction;
        if let Some(command) = self.command.as_mut() {
            command.set_transaction(transaction);
        }
    }

    fn open_connection_mut(&mut self) -> Result<&mut dyn DbConnection, AppError> {
        match self.connection.as_deref_mut() {
            Some(connection) if connection.is_open() => Ok(connection),
            _ => Err(AppError::InvalidState("connection is not open".to_string())),
        }
    }

    fn command_mut(&mut self) -> Result<&mut DbCommand, AppError> {
        self.command
            .as_mut()
            .ok_or_else(|| AppError::InvalidState("no command has been created".to_string()))
    }

    fn check_slow_query(&self, proc_name: &str, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > self.config.slow_query_threshold_ms {
            warn!(parent: &self.span, "Slow procedure call detected ({} ms): {}", elapsed_ms, proc_name);
        }
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        if self.is_connection_open() {
            warn!(parent: &self.span, "Session dropped with an open connection, releasing it");
        }
    }
}

fn timeout_error(proc_name: &str, timeout: Duration) -> AppError {
    AppError::Timeout(format!("{} did not complete within {:?}", proc_name, timeout))
}
