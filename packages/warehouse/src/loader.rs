//! The warehouse capability the ingestion pipeline appends through.

use std::path::Path;

use portal_ingest_retry::Retryable;

/// One Parquet file to append to one table.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    /// Destination table, without dataset qualifier.
    pub table: &'a str,
    /// Column names in file order. Every column is text.
    pub columns: &'a [String],
    /// The Parquet file to load.
    pub parquet: &'a Path,
    /// Rows in the file, for logging and verification.
    pub rows: usize,
}

/// Errors from appending to the warehouse.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// `DuckDB` rejected a statement.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error around the database file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The warehouse reported a different row count than was sent.
    #[error("Appended {appended} rows to {table}, expected {expected}")]
    RowCount {
        /// Destination table.
        table: String,
        /// Rows in the file.
        expected: usize,
        /// Rows the warehouse reported appending.
        appended: usize,
    },
}

impl Retryable for LoadError {}

/// Appends columnar files to named tables.
///
/// Appending never truncates or replaces: loading the same file twice
/// yields two copies of its rows.
pub trait WarehouseLoader {
    /// Dataset (schema) tables live in, for log messages.
    fn dataset(&self) -> &str;

    /// Appends `request.parquet` to `request.table`, creating the table
    /// with all-text columns if it does not exist. Returns rows appended.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the load is not confirmed.
    fn append(&mut self, request: &LoadRequest<'_>) -> Result<usize, LoadError>;
}
