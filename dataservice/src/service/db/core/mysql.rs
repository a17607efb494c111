//! MySQL / MariaDB driver
//!
//! Commands run as `CALL proc(?, ...)` over a single `sqlx` connection.
//! MySQL has no table-valued parameters: a structured parameter is sent as a
//! JSON array (see [`TableValue::to_json`]) for the procedure to expand with
//! `JSON_TABLE`. Output parameters travel through session variables that are
//! read back after a non-query call.

use crate::config::db::DbConfig;
use crate::service::db::core::command::DbCommand;
use crate::service::db::core::driver::{DbConnection, DbConnector, DbReader, NonQueryOutcome};
use crate::service::db::core::types::{
    DataColumn, DataRow, DbParameter, DbValue, IsolationLevel, ParameterDirection, ParameterValue,
    TableValue,
};
use crate::tool::error::helpers::map_sqlx_error;
use crate::tool::error::AppError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlQueryResult, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Either, Executor, Row, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::debug;

lazy_static! {
    static ref PROCEDURE_NAME_PATTERN: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$")
            .expect("valid procedure name pattern");
    static ref PARAMETER_NAME_PATTERN: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid parameter name pattern");
}

/// Opens one `MySqlConnection` per session.
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
}

impl MySqlConnector {
    pub fn new(config: &DbConfig) -> Self {
        Self {
            options: config.connect_options(),
            connect_timeout: config.connect_timeout,
        }
    }

    pub fn from_options(options: MySqlConnectOptions, connect_timeout: Duration) -> Self {
        Self {
            options,
            connect_timeout,
        }
    }
}

#[async_trait]
impl DbConnector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn DbConnection>, AppError> {
        let conn = tokio::time::timeout(self.connect_timeout, MySqlConnection::connect_with(&self.options))
            .await
            .map_err(|_| {
                AppError::Timeout(format!("connect did not complete within {:?}", self.connect_timeout))
            })?
            .map_err(|e| map_sqlx_error(e, "connect"))?;

        Ok(Box::new(MySqlDbConnection {
            conn,
            statement: String::new(),
            open: true,
        }))
    }
}

struct MySqlDbConnection {
    conn: MySqlConnection,
    /// Rendered `CALL` statement of the running command; readers borrow it.
    statement: String,
    open: bool,
}

impl MySqlDbConnection {
    async fn run_control(&mut self, sql: &str) -> Result<(), AppError> {
        self.conn
            .execute(sql)
            .await
            .map_err(|e| AppError::TransactionFailed(format!("{}: {}", sql, e)))?;
        Ok(())
    }

    /// Seeds the session variables of output parameters; returns `(name, variable)` pairs.
    async fn prepare_outputs(&mut self, command: &DbCommand) -> Result<Vec<(String, String)>, AppError> {
        let mut outputs = Vec::new();

        for parameter in command.parameters() {
            let direction = parameter.direction();
            if !direction.is_output() {
                continue;
            }
            if direction == ParameterDirection::ReturnValue {
                return Err(AppError::InvalidInput(format!(
                    "return value parameter {} is not supported by MySQL procedures",
                    parameter.name()
                )));
            }

            let variable = session_variable(parameter.name())?;
            let sql = format!("SET {} = ?", variable);
            let query = if direction.carries_input() {
                bind_parameter(sqlx::query(&sql), parameter)
            } else {
                sqlx::query(&sql).bind(Option::<String>::None)
            };
            query
                .execute(&mut self.conn)
                .await
                .map_err(|e| map_sqlx_error(e, parameter.name()))?;

            outputs.push((parameter.name().to_string(), variable));
        }

        Ok(outputs)
    }

    fn render_call(&mut self, command: &DbCommand) -> Result<(), AppError> {
        let procedure = quote_procedure(command.text())?;

        let mut placeholders = Vec::with_capacity(command.parameters().len());
        for parameter in command.parameters() {
            if parameter.direction().is_output() {
                placeholders.push(session_variable(parameter.name())?);
            } else {
                placeholders.push("?".to_string());
            }
        }

        self.statement = format!("CALL {}({})", procedure, placeholders.join(", "));
        Ok(())
    }

    async fn read_outputs(&mut self, outputs: &[(String, String)]) -> Result<Vec<(String, DbValue)>, AppError> {
        if outputs.is_empty() {
            return Ok(Vec::new());
        }

        let variables: Vec<&str> = outputs.iter().map(|(_, variable)| variable.as_str()).collect();
        let sql = format!("SELECT {}", variables.join(", "));
        let row = sqlx::query(&sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| map_sqlx_error(e, "read output parameters"))?;

        let mut values = Vec::with_capacity(outputs.len());
        for (index, (name, _)) in outputs.iter().enumerate() {
            values.push((name.clone(), decode_column(&row, index)?));
        }
        Ok(values)
    }
}

#[async_trait]
impl DbConnection for MySqlDbConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn begin_transaction(&mut self, level: IsolationLevel) -> Result<(), AppError> {
        let isolation_sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_str());
        self.run_control(&isolation_sql).await?;
        self.run_control("START TRANSACTION").await?;
        debug!("Transaction isolation level set to {:?}", level);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        self.run_control("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        self.run_control("ROLLBACK").await
    }

    async fn execute_non_query(&mut self, command: &DbCommand) -> Result<NonQueryOutcome, AppError> {
        let outputs = self.prepare_outputs(command).await?;
        self.render_call(command)?;

        let query = bind_inputs(sqlx::query(&self.statement), command);
        let result: MySqlQueryResult = query
            .execute(&mut self.conn)
            .await
            .map_err(|e| map_sqlx_error(e, command.text()))?;

        Ok(NonQueryOutcome {
            rows_affected: result.rows_affected(),
            outputs: self.read_outputs(&outputs).await?,
        })
    }

    async fn execute_reader<'c>(
        &'c mut self,
        command: &'c DbCommand,
    ) -> Result<Box<dyn DbReader + 'c>, AppError> {
        self.prepare_outputs(command).await?;
        self.render_call(command)?;

        let Self { conn, statement, .. } = self;
        let statement: &'c String = statement;
        let stream = bind_inputs(sqlx::query(statement.as_str()), command).fetch_many(conn);

        Ok(Box::new(MySqlReader {
            stream,
            columns: Vec::new(),
            procedure: command.text(),
            timeout: command.timeout(),
            exhausted: false,
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        let this = *self;
        this.conn
            .close()
            .await
            .map_err(|e| map_sqlx_error(e, "close connection"))
    }
}

/// Cursor over the first result set of a `CALL`.
struct MySqlReader<'c> {
    stream: BoxStream<'c, Result<Either<MySqlQueryResult, MySqlRow>, sqlx::Error>>,
    columns: Vec<DataColumn>,
    procedure: &'c str,
    timeout: Duration,
    exhausted: bool,
}

#[async_trait]
impl<'c> DbReader for MySqlReader<'c> {
    fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<DataRow>, AppError> {
        if self.exhausted {
            return Ok(None);
        }

        let item = tokio::time::timeout(self.timeout, self.stream.try_next())
            .await
            .map_err(|_| {
                AppError::Timeout(format!("{} did not complete within {:?}", self.procedure, self.timeout))
            })?
            .map_err(|e| map_sqlx_error(e, self.procedure))?;

        match item {
            Some(Either::Right(row)) => {
                if self.columns.is_empty() {
                    self.columns = row
                        .columns()
                        .iter()
                        .map(|c| DataColumn::new(c.name(), c.type_info().name()))
                        .collect();
                }
                Ok(Some(decode_row(&row)?))
            }
            // End of the first result set (or a CALL that produced none).
            Some(Either::Left(_)) | None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        let mut this = *self;
        let timeout = this.timeout;
        let procedure = this.procedure;

        let drained = tokio::time::timeout(timeout, async {
            while this.stream.try_next().await?.is_some() {}
            Ok::<_, sqlx::Error>(())
        })
        .await
        .map_err(|_| AppError::Timeout(format!("{} did not complete within {:?}", procedure, timeout)))?;

        drained.map_err(|e| map_sqlx_error(e, procedure))
    }
}

fn bind_inputs<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    command: &DbCommand,
) -> Query<'q, MySql, MySqlArguments> {
    for parameter in command.parameters() {
        if parameter.direction() == ParameterDirection::Input {
            query = bind_parameter(query, parameter);
        }
    }
    query
}

fn bind_parameter<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    parameter: &DbParameter,
) -> Query<'q, MySql, MySqlArguments> {
    match parameter.value() {
        ParameterValue::Scalar(value) => bind_value(query, value),
        ParameterValue::Table(table) => query.bind(encode_table_value(table)),
        ParameterValue::Unassigned => query.bind(Option::<String>::None),
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &DbValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        DbValue::Null => query.bind(Option::<String>::None),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Int(i) => query.bind(*i),
        DbValue::Float(f) => query.bind(*f),
        DbValue::Text(s) => query.bind(s.clone()),
        DbValue::Bytes(b) => query.bind(b.clone()),
        DbValue::Date(d) => query.bind(*d),
        DbValue::DateTime(dt) => query.bind(*dt),
        DbValue::Time(t) => query.bind(*t),
    }
}

fn encode_table_value(table: &TableValue) -> String {
    table.to_json().to_string()
}

/// Backtick-quotes `name` or `schema.name` after checking it is a plain identifier.
fn quote_procedure(name: &str) -> Result<String, AppError> {
    if !PROCEDURE_NAME_PATTERN.is_match(name) {
        return Err(AppError::InvalidInput(format!("invalid procedure name: {:?}", name)));
    }

    Ok(name
        .split('.')
        .map(|part| format!("`{}`", part))
        .collect::<Vec<_>>()
        .join("."))
}

fn session_variable(parameter_name: &str) -> Result<String, AppError> {
    let bare = parameter_name.trim_start_matches('@');
    if !PARAMETER_NAME_PATTERN.is_match(bare) {
        return Err(AppError::InvalidInput(format!(
            "invalid output parameter name: {:?}",
            parameter_name
        )));
    }
    Ok(format!("@p_{}", bare))
}

fn decode_row(row: &MySqlRow) -> Result<DataRow, AppError> {
    (0..row.len()).map(|index| decode_column(row, index)).collect()
}

/// Converts one column of `row` by its MySQL type.
fn decode_column(row: &MySqlRow, index: usize) -> Result<DbValue, AppError> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| map_sqlx_error(e, "read column"))?;
    if raw.is_null() {
        return Ok(DbValue::Null);
    }

    let type_name = row.column(index).type_info().name();
    let decoded = match type_name {
        "BOOLEAN" => row.try_get_unchecked::<bool, _>(index).map(DbValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            row.try_get_unchecked::<i64, _>(index).map(DbValue::Int)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get_unchecked::<u64, _>(index).map(|v| {
            i64::try_from(v)
                .map(DbValue::Int)
                .unwrap_or_else(|_| DbValue::Text(v.to_string()))
        }),
        "FLOAT" => row
            .try_get_unchecked::<f32, _>(index)
            .map(|v| DbValue::Float(v as f64)),
        "DOUBLE" => row.try_get_unchecked::<f64, _>(index).map(DbValue::Float),
        // Sent as text by the server; kept exact.
        "DECIMAL" => row.try_get_unchecked::<String, _>(index).map(DbValue::Text),
        "DATE" => row
            .try_get_unchecked::<chrono::NaiveDate, _>(index)
            .map(DbValue::Date),
        "DATETIME" => row
            .try_get_unchecked::<chrono::NaiveDateTime, _>(index)
            .map(DbValue::DateTime),
        "TIMESTAMP" => row
            .try_get_unchecked::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|v| DbValue::DateTime(v.naive_utc())),
        "TIME" => {
            let raw = row
                .try_get_unchecked::<Vec<u8>, _>(index)
                .map_err(|e| map_sqlx_error(e, "decode column"))?;
            return decode_time(&raw);
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => row.try_get_unchecked::<Vec<u8>, _>(index).map(DbValue::Bytes),
        "NULL" => Ok(DbValue::Null),
        // CHAR, VARCHAR, TEXT variants, ENUM, SET, JSON
        _ => row.try_get_unchecked::<String, _>(index).map(DbValue::Text),
    };

    decoded.map_err(|e| map_sqlx_error(e, "decode column"))
}

/// Decodes a TIME value.
///
/// MySQL TIME spans `-838:59:59..=838:59:59`. Values within a day come back as
/// [`DbValue::Time`]; negative values or values with a day part come back as
/// text in MySQL's own `[-]HHH:MM:SS[.ffffff]` form.
fn decode_time(raw: &[u8]) -> Result<DbValue, AppError> {
    let invalid = || AppError::DatabaseQuery(format!("decode column: malformed TIME value {:?}", raw));

    // Text protocol: "HH:MM:SS[.ffffff]", possibly signed or beyond 24h.
    if raw.first().map_or(false, |b| b.is_ascii_digit() || *b == b'-') {
        let text = std::str::from_utf8(raw).map_err(|_| invalid())?;
        return Ok(chrono::NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .map(DbValue::Time)
            .unwrap_or_else(|_| DbValue::Text(text.to_string())));
    }

    // Binary protocol: length, sign, days (u32 LE), hours, minutes, seconds, [micros (u32 LE)]
    let (&len, body) = raw.split_first().ok_or_else(invalid)?;
    if len == 0 {
        return chrono::NaiveTime::from_hms_opt(0, 0, 0)
            .map(DbValue::Time)
            .ok_or_else(invalid);
    }
    if (len != 8 && len != 12) || body.len() != len as usize {
        return Err(invalid());
    }

    let negative = body[0] == 1;
    let days = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
    let (hours, minutes, seconds) = (u32::from(body[5]), u32::from(body[6]), u32::from(body[7]));
    let micros = if len == 12 {
        u32::from_le_bytes([body[8], body[9], body[10], body[11]])
    } else {
        0
    };

    if !negative && days == 0 {
        return chrono::NaiveTime::from_hms_micro_opt(hours, minutes, seconds, micros)
            .map(DbValue::Time)
            .ok_or_else(invalid);
    }

    let total_hours = u64::from(days) * 24 + u64::from(hours);
    let mut text = format!(
        "{}{:02}:{:02}:{:02}",
        if negative { "-" } else { "" },
        total_hours,
        minutes,
        seconds
    );
    if micros > 0 {
        text.push_str(&format!(".{:06}", micros));
    }
    Ok(DbValue::Text(text))
}
