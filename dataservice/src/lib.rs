//! Generic row retrieval over a stored procedure
//!
//! A caller names a table, a column list, a filter and an ordering; the
//! [`DataService`](service::DataService) binds them as parameters of the
//! `GetDataFromDatabase` procedure and returns the rows as a
//! [`DataTable`](service::db::DataTable).
//!
//! ```no_run
//! use dataservice::config::DbConfig;
//! use dataservice::model::GetDataRequest;
//! use dataservice::service::db::ServiceConfig;
//! use dataservice::service::{DataService, DataServiceImpl};
//!
//! # async fn run() -> Result<(), dataservice::tool::AppError> {
//! let service = DataServiceImpl::mysql(&DbConfig::from_env()?, ServiceConfig::from_env());
//! let request = GetDataRequest::new("Orders", &["Id", "Name"], "Id>5", "Name");
//! request.validate()?;
//!
//! let table = service.get_data(&request).await?;
//! println!("{} rows", table.row_count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod model;
pub mod service;
pub mod tool;
