#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion half of a run: downloaded CSV reports become Parquet files,
//! which are appended to their warehouse tables.
//!
//! - [`columnar`] reads a CSV with every column as text and writes it as
//!   Parquet.
//! - [`loader`] is the warehouse capability the pipeline appends through.
//! - [`warehouse_db`] implements it on a local `DuckDB` file.
//! - [`pipeline`] validates the batch, loads it, and cleans up.

pub mod columnar;
pub mod loader;
pub mod pipeline;
pub mod warehouse_db;

pub use loader::{LoadError, LoadRequest, WarehouseLoader};
pub use pipeline::{IngestError, IngestionPipeline, LoadReport, TableLoad};
pub use warehouse_db::DuckDbWarehouse;
