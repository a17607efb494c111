//! Runs one row retrieval request against the configured database.
//!
//! Usage: `get_data [request.json]` (reads the request from stdin when no
//! path is given). Prints the rows as a JSON array of records.

use anyhow::{Context, Result};
use dataservice::config::DbConfig;
use dataservice::config::db::load_env_file;
use dataservice::logging::{init_logging, LoggingConfig};
use dataservice::model::GetDataRequest;
use dataservice::service::db::ServiceConfig;
use dataservice::service::{DataService, DataServiceImpl};
use std::io::Read;
use std::time::Instant;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_logging(&LoggingConfig::from_env())?;

    let body = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read request file {path}"))?,
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("failed to read request from stdin")?;
            body
        }
    };

    let request: GetDataRequest =
        serde_json::from_str(&body).context("Invalid json format!")?;
    request.validate()?;

    let db_config = DbConfig::from_env()?;
    let service = DataServiceImpl::mysql(&db_config, ServiceConfig::from_env());

    let started = Instant::now();
    let table = service.get_data(&request).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if table.is_empty() {
        warn!(table = %request.table_name, elapsed_ms, "No data returned!");
        eprintln!("No data returned!");
        return Ok(());
    }

    info!(table = %request.table_name, rows = table.row_count(), elapsed_ms, "Returned data");
    println!("{}", serde_json::to_string_pretty(&table.to_records())?);
    Ok(())
}
