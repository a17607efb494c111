//! Common type definitions for the data-access layer
//!
//! Values, parameters and the materialized result table shared by the
//! session, the drivers and the retrieval service.

use crate::service::db::core::driver::DbReader;
use crate::tool::error::AppError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single typed column or parameter value.
///
/// Serialized externally tagged (`{"Date":"2024-01-02"}`) so a value reads
/// back as the same variant. Plain JSON for callers comes from
/// [`DataTable::to_records`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Length used for size-bounded parameters (characters for text, bytes for binary).
    fn bounded_len(&self) -> Option<usize> {
        match self {
            DbValue::Text(s) => Some(s.chars().count()),
            DbValue::Bytes(b) => Some(b.len()),
            _ => None,
        }
    }

    /// JSON form used when the value travels inside a structured parameter.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DbValue::Null => serde_json::Value::Null,
            DbValue::Bool(b) => serde_json::Value::Bool(*b),
            DbValue::Int(i) => serde_json::Value::from(*i),
            DbValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DbValue::Text(s) => serde_json::Value::String(s.clone()),
            DbValue::Bytes(b) => serde_json::Value::from(b.clone()),
            DbValue::Date(d) => serde_json::Value::String(d.to_string()),
            DbValue::DateTime(dt) => serde_json::Value::String(dt.to_string()),
            DbValue::Time(t) => serde_json::Value::String(t.to_string()),
        }
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbValue::Null => write!(f, "NULL"),
            DbValue::Bool(b) => write!(f, "{}", b),
            DbValue::Int(i) => write!(f, "{}", i),
            DbValue::Float(v) => write!(f, "{}", v),
            DbValue::Text(s) => write!(f, "{}", s),
            DbValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            DbValue::Date(d) => write!(f, "{}", d),
            DbValue::DateTime(dt) => write!(f, "{}", dt),
            DbValue::Time(t) => write!(f, "{}", t),
        }
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Int(v as i64)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Float(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&String> for DbValue {
    fn from(v: &String) -> Self {
        DbValue::Text(v.clone())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        DbValue::Bytes(v)
    }
}

impl From<NaiveDate> for DbValue {
    fn from(v: NaiveDate) -> Self {
        DbValue::Date(v)
    }
}

impl From<NaiveDateTime> for DbValue {
    fn from(v: NaiveDateTime) -> Self {
        DbValue::DateTime(v)
    }
}

impl From<NaiveTime> for DbValue {
    fn from(v: NaiveTime) -> Self {
        DbValue::Time(v)
    }
}

/// `None` becomes an explicit database NULL.
impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DbValue::Null)
    }
}

/// Declared parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Decimal,
    Float,
    Char,
    VarChar,
    NVarChar,
    Text,
    Binary,
    VarBinary,
    Date,
    DateTime,
    Time,
    /// Table-valued parameter
    Structured,
}

impl DbType {
    /// Types whose values are limited by a declared size.
    pub fn is_sized(&self) -> bool {
        matches!(
            self,
            DbType::Char | DbType::VarChar | DbType::NVarChar | DbType::Binary | DbType::VarBinary
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDirection {
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    pub fn is_output(&self) -> bool {
        !matches!(self, ParameterDirection::Input)
    }

    pub fn carries_input(&self) -> bool {
        matches!(self, ParameterDirection::Input | ParameterDirection::InputOutput)
    }
}

/// Tabular value passed as a single structured parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TableValue {
    columns: Vec<String>,
    rows: Vec<Vec<DbValue>>,
}

impl TableValue {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// One column, one row per value, in iteration order.
    pub fn single_column<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DbValue>,
    {
        Self {
            columns: vec![column.to_string()],
            rows: values.into_iter().map(|v| vec![v.into()]).collect(),
        }
    }

    pub fn add_row(&mut self, row: Vec<DbValue>) -> Result<(), AppError> {
        if row.len() != self.columns.len() {
            return Err(AppError::InvalidInput(format!(
                "row has {} values, table value has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<DbValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// JSON encoding for drivers without native table-valued parameters.
    ///
    /// A single-column value becomes an array of scalars, anything wider an
    /// array of objects keyed by column name. Row order is kept.
    pub fn to_json(&self) -> serde_json::Value {
        if self.columns.len() == 1 {
            return serde_json::Value::Array(
                self.rows.iter().map(|row| row[0].to_json()).collect(),
            );
        }

        serde_json::Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    let record = self
                        .columns
                        .iter()
                        .zip(row)
                        .map(|(column, value)| (column.clone(), value.to_json()))
                        .collect::<serde_json::Map<_, _>>();
                    serde_json::Value::Object(record)
                })
                .collect(),
        )
    }
}

/// Value carried by a bound parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Scalar(DbValue),
    Table(TableValue),
    /// Pure output parameter with no input value
    Unassigned,
}

/// A named parameter bound to the current command.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParameter {
    name: String,
    value: ParameterValue,
    db_type: DbType,
    size: Option<usize>,
    direction: ParameterDirection,
    type_name: Option<String>,
}

impl DbParameter {
    /// Scalar parameter. A `None` value is bound as NULL.
    pub fn new(
        name: &str,
        value: impl Into<DbValue>,
        db_type: DbType,
        direction: ParameterDirection,
    ) -> Self {
        Self {
            name: name.to_string(),
            value: ParameterValue::Scalar(value.into()),
            db_type,
            size: None,
            direction,
            type_name: None,
        }
    }

    /// Input parameter shorthand.
    pub fn input(name: &str, value: impl Into<DbValue>, db_type: DbType) -> Self {
        Self::new(name, value, db_type, ParameterDirection::Input)
    }

    /// Table-valued parameter of server-side type `type_name`.
    pub fn structured(
        name: &str,
        value: TableValue,
        direction: ParameterDirection,
        type_name: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            value: ParameterValue::Table(value),
            db_type: DbType::Structured,
            size: None,
            direction,
            type_name: Some(type_name.to_string()),
        }
    }

    /// Parameter without an input value (output / return value).
    pub fn output(name: &str, db_type: DbType, direction: ParameterDirection) -> Self {
        Self {
            name: name.to_string(),
            value: ParameterValue::Unassigned,
            db_type,
            size: None,
            direction,
            type_name: None,
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ParameterValue {
        &self.value
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Rejects values that the store would otherwise truncate or misread.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim_start_matches('@').is_empty() {
            return Err(AppError::InvalidInput("parameter name is empty".to_string()));
        }

        match (&self.value, self.db_type) {
            (ParameterValue::Table(_), DbType::Structured) => {
                if self.type_name.as_deref().map_or(true, str::is_empty) {
                    return Err(AppError::InvalidInput(format!(
                        "structured parameter {} requires a type name",
                        self.name
                    )));
                }
            }
            (ParameterValue::Table(_), _) | (_, DbType::Structured) => {
                return Err(AppError::InvalidInput(format!(
                    "parameter {} mixes tabular and scalar binding",
                    self.name
                )));
            }
            (ParameterValue::Scalar(value), db_type) => {
                if let (true, Some(size), Some(len)) = (db_type.is_sized(), self.size, value.bounded_len()) {
                    if len > size {
                        return Err(AppError::InvalidInput(format!(
                            "value for {} is {} long, exceeds declared size {}",
                            self.name, len, size
                        )));
                    }
                }
            }
            (ParameterValue::Unassigned, _) => {
                if self.direction == ParameterDirection::Input {
                    return Err(AppError::InvalidInput(format!(
                        "input parameter {} has no value",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Column of a result table; `data_type` is the driver's type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    pub data_type: String,
}

impl DataColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

pub type DataRow = Vec<DbValue>;

/// Fully drained, in-memory result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    name: String,
    columns: Vec<DataColumn>,
    rows: Vec<DataRow>,
}

impl DataTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row` for the named column.
    pub fn value(&self, row: usize, column: &str) -> Option<&DbValue> {
        let index = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row)?.get(index)
    }

    /// Drains `reader` into this table, taking the schema from the reader.
    ///
    /// Returns the number of rows read. The reader is left open.
    pub async fn load(&mut self, reader: &mut (dyn DbReader + '_)) -> Result<usize, AppError> {
        let mut count = 0;

        while let Some(row) = reader.next_row().await? {
            if self.columns.is_empty() {
                self.columns = reader.columns().to_vec();
            }
            if row.len() != self.columns.len() {
                return Err(AppError::DatabaseQuery(format!(
                    "row has {} values, result has {} columns",
                    row.len(),
                    self.columns.len()
                )));
            }
            self.rows.push(row);
            count += 1;
        }

        if self.columns.is_empty() {
            self.columns = reader.columns().to_vec();
        }

        Ok(count)
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    let record = self
                        .columns
                        .iter()
                        .zip(row)
                        .map(|(column, value)| (column.name.clone(), value.to_json()))
                        .collect::<serde_json::Map<_, _>>();
                    serde_json::Value::Object(record)
                })
                .collect(),
        )
    }
}
