//! [`WarehouseLoader`] backed by a local `DuckDB` database.
//!
//! The project id names the database file and the dataset id names the
//! schema, so `<project>.<dataset>.<table>` reads the same way it would
//! in a cloud warehouse.

use std::path::Path;

use duckdb::Connection;

use crate::loader::{LoadError, LoadRequest, WarehouseLoader};

/// Quotes an identifier for `DuckDB`.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal for `DuckDB`.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A `DuckDB` database holding one dataset.
pub struct DuckDbWarehouse {
    conn: Connection,
    dataset: String,
}

impl std::fmt::Debug for DuckDbWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbWarehouse")
            .field("dataset", &self.dataset)
            .finish_non_exhaustive()
    }
}

impl DuckDbWarehouse {
    /// Opens (or creates) the database at `path` and ensures `dataset`
    /// exists as a schema.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file cannot be opened or the schema
    /// created.
    pub fn open(path: &Path, dataset: &str) -> Result<Self, LoadError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        log::info!("Opened warehouse {}", path.display());
        Self::with_connection(conn, dataset)
    }

    /// Opens a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if `DuckDB` cannot start.
    pub fn open_in_memory(dataset: &str) -> Result<Self, LoadError> {
        Self::with_connection(Connection::open_in_memory()?, dataset)
    }

    fn with_connection(conn: Connection, dataset: &str) -> Result<Self, LoadError> {
        conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {};",
            quote_ident(dataset)
        ))?;
        Ok(Self {
            conn,
            dataset: dataset.to_owned(),
        })
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.dataset), quote_ident(table))
    }

    /// Rows currently in `table`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the table does not exist.
    pub fn row_count(&self, table: &str) -> Result<u64, LoadError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.qualified(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Column names of `table`, in table order.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the catalog query fails.
    pub fn columns(&self, table: &str) -> Result<Vec<String>, LoadError> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ?
             ORDER BY ordinal_position",
        )?;
        let names = stmt
            .query_map([self.dataset.as_str(), table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

impl WarehouseLoader for DuckDbWarehouse {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn append(&mut self, request: &LoadRequest<'_>) -> Result<usize, LoadError> {
        let target = self.qualified(request.table);
        let column_defs = request
            .columns
            .iter()
            .map(|c| format!("{} VARCHAR", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");

        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {target} ({column_defs});"
        ))?;

        let source = quote_literal(&request.parquet.to_string_lossy());
        let appended = self.conn.execute(
            &format!("INSERT INTO {target} BY NAME SELECT * FROM read_parquet({source})"),
            [],
        )?;

        if appended != request.rows {
            return Err(LoadError::RowCount {
                table: request.table.to_owned(),
                expected: request.rows,
                appended,
            });
        }

        log::info!("  appended {appended} rows to {}.{}", self.dataset, request.table);
        Ok(appended)
    }
}
