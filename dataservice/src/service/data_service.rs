//! Data retrieval service
//!
//! Fetches rows from an arbitrary table through the `GetDataFromDatabase`
//! stored procedure. The procedure builds the actual query; this service only
//! binds the caller's strings as parameters and materializes the result.

use crate::config::db::DbConfig;
use crate::model::GetDataRequest;
use crate::service::db::core::config::ServiceConfig;
use crate::service::db::core::driver::DbConnector;
use crate::service::db::core::mysql::MySqlConnector;
use crate::service::db::core::session::DbSession;
use crate::service::db::core::types::{DataTable, DbParameter, DbType, ParameterDirection, TableValue};
use crate::tool::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Span};

pub const GET_DATA_PROCEDURE: &str = "GetDataFromDatabase";
pub const DEFAULT_RESULT_TABLE_NAME: &str = "ResultData";

/// Server-side type of the column list parameter and its single column.
pub const COLUMN_LIST_TYPE_NAME: &str = "dbo.ColumnListType";
pub const COLUMN_LIST_COLUMN: &str = "ColumnName";

const TABLE_NAME_SIZE: usize = 100;
const EXPRESSION_SIZE: usize = 1000;

#[async_trait]
pub trait DataService: Send + Sync {
    /// Returns the rows of `table_name` selected by `filter` and sorted by
    /// `order_by`, limited to `column_list`.
    ///
    /// The result table is named `result_table_name`, or `"ResultData"` when
    /// absent or empty. An empty table is a successful result.
    async fn get_data_from_database(
        &self,
        table_name: &str,
        column_list: &[String],
        filter: &str,
        order_by: &str,
        result_table_name: Option<&str>,
    ) -> Result<DataTable, AppError>;

    async fn get_data(&self, request: &GetDataRequest) -> Result<DataTable, AppError> {
        self.get_data_from_database(
            &request.table_name,
            &request.column_list,
            &request.filter,
            &request.order_by,
            request.data_table_name.as_deref(),
        )
        .await
    }
}

pub struct DataServiceImpl {
    connector: Arc<dyn DbConnector>,
    config: ServiceConfig,
    span: Span,
}

impl DataServiceImpl {
    /// Creates the service; every call opens its own session through `connector`.
    pub fn new(connector: Arc<dyn DbConnector>, config: ServiceConfig, span: Span) -> Self {
        Self {
            connector,
            config,
            span,
        }
    }

    /// Service backed by MySQL.
    pub fn mysql(db_config: &DbConfig, config: ServiceConfig) -> Self {
        let span = info_span!("data_service", database = %db_config.database);
        Self::new(Arc::new(MySqlConnector::new(db_config)), config, span)
    }

    fn open_session(&self, table_name: &str) -> DbSession {
        let span = info_span!(
            parent: &self.span,
            "db_session",
            procedure = GET_DATA_PROCEDURE,
            table = table_name
        );
        DbSession::new(self.connector.clone(), self.config.session.clone(), span)
    }
}

#[async_trait]
impl DataService for DataServiceImpl {
    async fn get_data_from_database(
        &self,
        table_name: &str,
        column_list: &[String],
        filter: &str,
        order_by: &str,
        result_table_name: Option<&str>,
    ) -> Result<DataTable, AppError> {
        let result_table_name = match result_table_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => DEFAULT_RESULT_TABLE_NAME.to_string(),
        };
        let parameters = get_data_parameters(table_name, column_list, filter, order_by);
        let read_uncommitted = self.config.read_uncommitted;
        let started = Instant::now();

        let mut session = self.open_session(table_name);
        let outcome = session
            .with_connection(move |session| {
                Box::pin(async move {
                    if read_uncommitted {
                        session.create_transaction().await?;
                    }
                    session.create_command()?;
                    for parameter in parameters {
                        session.add_parameter(parameter)?;
                    }
                    session
                        .get_data_table(GET_DATA_PROCEDURE, Some(result_table_name.as_str()))
                        .await
                })
            })
            .await;

        match outcome {
            Ok(table) => {
                info!(
                    parent: &self.span,
                    table = table_name,
                    rows = table.row_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Get data finished"
                );
                Ok(table)
            }
            Err(e) => {
                let err = AppError::stored_procedure(GET_DATA_PROCEDURE, e);
                err.log_in(&self.span, "get data");
                Err(err)
            }
        }
    }
}

/// Parameters of `GetDataFromDatabase`, in declaration order.
///
/// The column list travels as a one-column table value, one row per name in
/// caller order.
pub fn get_data_parameters(
    table_name: &str,
    column_list: &[String],
    filter: &str,
    order_by: &str,
) -> Vec<DbParameter> {
    let columns = TableValue::single_column(COLUMN_LIST_COLUMN, column_list);

    vec![
        DbParameter::input("@sTableName", table_name, DbType::VarChar).with_size(TABLE_NAME_SIZE),
        DbParameter::structured(
            "@sColumnList",
            columns,
            ParameterDirection::Input,
            COLUMN_LIST_TYPE_NAME,
        ),
        DbParameter::input("@sFilter", filter, DbType::VarChar).with_size(EXPRESSION_SIZE),
        DbParameter::input("@sOrderBy", order_by, DbType::VarChar).with_size(EXPRESSION_SIZE),
    ]
}
