#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for one portal ingest run.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use portal_ingest::config::{Config, DEFAULT_LOG_DIR};
use portal_ingest::run;
use portal_ingest_models::JobOutcome;
use portal_ingest_portal::webdriver::WebDriverFactory;
use portal_ingest_warehouse::DuckDbWarehouse;

#[derive(Parser)]
#[command(
    name = "portal_ingest",
    about = "Download portal reports and append them to the warehouse"
)]
struct Cli {
    /// Date-range option to select on every report (overrides `PORTAL_DATE_RANGE`)
    #[arg(long)]
    date_range: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_dir = std::env::var("LOG_DIR")
        .map_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR), PathBuf::from);
    let log_path = portal_ingest_cli_utils::init_logger(&log_dir)?;

    let config = match Config::from_env() {
        Ok(config) => config.with_date_range(cli.date_range),
        Err(e) => {
            log::error!("{e}");
            return Err(e.into());
        }
    };

    log::info!(
        "Starting run for '{}' (log: {})",
        config.date_range,
        log_path.display()
    );
    let start = Instant::now();

    let factory = WebDriverFactory::new(&config.webdriver_url);
    let warehouse_path = config.warehouse_path();
    let result = run::execute(&config, &factory, || {
        DuckDbWarehouse::open(&warehouse_path, &config.dataset_id)
    })
    .await;

    match result {
        Ok(summary) => {
            for outcome in &summary.outcomes {
                match outcome {
                    JobOutcome::Downloaded(file) => {
                        log::info!("  {}: {}", file.report_type, file.path.display());
                    }
                    JobOutcome::NoData(report_type) => log::info!("  {report_type}: no data"),
                }
            }
            for table in &summary.load.tables {
                log::info!("  {}.{}: +{} rows", config.dataset_id, table.table, table.rows);
            }
            log::info!(
                "Run complete in {:.1}s: {} rows appended",
                start.elapsed().as_secs_f64(),
                summary.load.total_rows()
            );
            Ok(())
        }
        Err(e) => {
            log::error!("Run failed after {:.1}s: {e}", start.elapsed().as_secs_f64());
            Err(e.into())
        }
    }
}
