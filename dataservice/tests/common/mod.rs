//! In-memory driver shared by the integration tests
//!
//! Records every connection, transaction and command event so tests can
//! assert on the session lifecycle without a database.

#![allow(dead_code)]

use async_trait::async_trait;
use dataservice::service::db::{
    DataColumn, DataRow, DbCommand, DbConnection, DbConnector, DbParameter, DbReader, DbValue,
    IsolationLevel, NonQueryOutcome,
};
use dataservice::tool::AppError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// A command as the driver received it.
#[derive(Debug, Clone)]
pub struct ExecutedCommand {
    pub procedure: String,
    pub parameters: Vec<DbParameter>,
    pub transaction: Option<IsolationLevel>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct DriverLog {
    pub connects: usize,
    pub closes: usize,
    pub begins: Vec<IsolationLevel>,
    pub commits: usize,
    pub rollbacks: usize,
    pub executed: Vec<ExecutedCommand>,
    pub readers_closed: usize,
}

impl DriverLog {
    pub fn open_connections(&self) -> usize {
        self.connects - self.closes
    }

    pub fn last_command(&self) -> &ExecutedCommand {
        self.executed.last().expect("no command executed")
    }
}

/// What the next execution does.
#[derive(Debug, Clone)]
pub enum Script {
    Rows {
        columns: Vec<DataColumn>,
        rows: Vec<DataRow>,
    },
    Fail(AppError),
    /// Serves `after` rows, then fails
    FailOnRead {
        columns: Vec<DataColumn>,
        rows: Vec<DataRow>,
        after: usize,
        error: AppError,
    },
    /// Serves each row after `delay`
    SlowRows {
        columns: Vec<DataColumn>,
        rows: Vec<DataRow>,
        delay: Duration,
    },
    /// Never completes
    Hang,
}

pub struct MemoryConnector {
    log: Arc<Mutex<DriverLog>>,
    script: Script,
    refuse: Option<AppError>,
    rows_affected: u64,
    outputs: Vec<(String, DbValue)>,
}

impl MemoryConnector {
    pub fn new(script: Script) -> Self {
        Self {
            log: Arc::new(Mutex::new(DriverLog::default())),
            script,
            refuse: None,
            rows_affected: 0,
            outputs: Vec::new(),
        }
    }

    /// Returns `rows` under columns given as `(name, type)` pairs.
    pub fn returning(columns: &[(&str, &str)], rows: Vec<DataRow>) -> Self {
        Self::new(Script::Rows {
            columns: columns_of(columns),
            rows,
        })
    }

    pub fn failing(error: AppError) -> Self {
        Self::new(Script::Fail(error))
    }

    pub fn refusing(error: AppError) -> Self {
        let mut connector = Self::new(Script::Rows {
            columns: Vec::new(),
            rows: Vec::new(),
        });
        connector.refuse = Some(error);
        connector
    }

    pub fn with_non_query_result(mut self, rows_affected: u64, outputs: Vec<(String, DbValue)>) -> Self {
        self.rows_affected = rows_affected;
        self.outputs = outputs;
        self
    }

    pub fn log(&self) -> DriverLog {
        self.log.lock().expect("driver log poisoned").clone()
    }
}

pub fn columns_of(columns: &[(&str, &str)]) -> Vec<DataColumn> {
    columns
        .iter()
        .map(|(name, data_type)| DataColumn::new(*name, *data_type))
        .collect()
}

#[async_trait]
impl DbConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn DbConnection>, AppError> {
        if let Some(error) = &self.refuse {
            return Err(error.clone());
        }

        self.log.lock().unwrap().connects += 1;
        Ok(Box::new(MemoryConnection {
            log: self.log.clone(),
            script: self.script.clone(),
            rows_affected: self.rows_affected,
            outputs: self.outputs.clone(),
        }))
    }
}

struct MemoryConnection {
    log: Arc<Mutex<DriverLog>>,
    script: Script,
    rows_affected: u64,
    outputs: Vec<(String, DbValue)>,
}

impl MemoryConnection {
    fn record(&self, command: &DbCommand) {
        self.log.lock().unwrap().executed.push(ExecutedCommand {
            procedure: command.text().to_string(),
            parameters: command.parameters().to_vec(),
            transaction: command.transaction(),
            timeout: command.timeout(),
        });
    }
}

#[async_trait]
impl DbConnection for MemoryConnection {
    fn is_open(&self) -> bool {
        true
    }

    async fn begin_transaction(&mut self, level: IsolationLevel) -> Result<(), AppError> {
        self.log.lock().unwrap().begins.push(level);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        self.log.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        self.log.lock().unwrap().rollbacks += 1;
        Ok(())
    }

    async fn execute_non_query(&mut self, command: &DbCommand) -> Result<NonQueryOutcome, AppError> {
        self.record(command);
        match &self.script {
            Script::Fail(error) => Err(error.clone()),
            Script::Hang => std::future::pending().await,
            _ => Ok(NonQueryOutcome {
                rows_affected: self.rows_affected,
                outputs: self.outputs.clone(),
            }),
        }
    }

    async fn execute_reader<'c>(
        &'c mut self,
        command: &'c DbCommand,
    ) -> Result<Box<dyn DbReader + 'c>, AppError> {
        self.record(command);

        let mut delay = None;
        let (columns, rows, fail_after) = match &self.script {
            Script::Fail(error) => return Err(error.clone()),
            Script::Hang => return std::future::pending().await,
            Script::Rows { columns, rows } => (columns.clone(), rows.clone(), None),
            Script::SlowRows {
                columns,
                rows,
                delay: row_delay,
            } => {
                delay = Some(*row_delay);
                (columns.clone(), rows.clone(), None)
            }
            Script::FailOnRead {
                columns,
                rows,
                after,
                error,
            } => (columns.clone(), rows.clone(), Some((*after, error.clone()))),
        };

        Ok(Box::new(MemoryReader {
            log: self.log.clone(),
            columns,
            rows: rows.into(),
            served: 0,
            fail_after,
            delay,
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

struct MemoryReader {
    log: Arc<Mutex<DriverLog>>,
    columns: Vec<DataColumn>,
    rows: VecDeque<DataRow>,
    served: usize,
    fail_after: Option<(usize, AppError)>,
    delay: Option<Duration>,
}

#[async_trait]
impl DbReader for MemoryReader {
    fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<DataRow>, AppError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((after, error)) = &self.fail_after {
            if self.served == *after {
                return Err(error.clone());
            }
        }

        let row = self.rows.pop_front();
        if row.is_some() {
            self.served += 1;
        }
        Ok(row)
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        self.log.lock().unwrap().readers_closed += 1;
        Ok(())
    }
}

pub fn row(values: Vec<DbValue>) -> DataRow {
    values
}

/// Counts ERROR events emitted while the returned guard is alive on this thread.
pub struct ErrorEvents(Arc<AtomicUsize>);

impl ErrorEvents {
    pub fn capture() -> (Self, tracing::subscriber::DefaultGuard) {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(CountErrors(count.clone()));
        (Self(count), tracing::subscriber::set_default(subscriber))
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

struct CountErrors(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for CountErrors {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
