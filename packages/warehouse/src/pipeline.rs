//! Loads a run's downloaded reports into the warehouse.
//!
//! The whole batch is one retry unit. Before anything is loaded the
//! directory must contain exactly the expected canonical files; anything
//! else is a structural error and nothing is touched. Each confirmed load
//! removes its CSV and Parquet files and is remembered, so a retry after a
//! partial batch only loads what is left.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use portal_ingest_models::{CSV_EXTENSION, ReportType, TableMapping};
use portal_ingest_retry::{RetryPolicy, Retryable};

use crate::columnar::{ColumnarError, convert_csv_to_parquet};
use crate::loader::{LoadError, LoadRequest, WarehouseLoader};

/// Errors from ingesting a batch.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A CSV in the download directory maps to no table.
    #[error("No table mapping for {0}")]
    UnmappedFile(String),

    /// The files present do not match the reports that were downloaded.
    #[error("Expected reports {expected:?}, found {found:?}")]
    CountMismatch {
        /// Reports still to load.
        expected: Vec<ReportType>,
        /// Reports whose files are present.
        found: Vec<ReportType>,
    },

    /// Listing or cleaning the directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A CSV could not be converted.
    #[error(transparent)]
    Columnar(#[from] ColumnarError),

    /// The warehouse did not confirm a load.
    #[error("Loading {table} failed: {source}")]
    Load {
        /// Destination table.
        table: String,
        /// Loader failure.
        #[source]
        source: LoadError,
    },
}

impl Retryable for IngestError {
    fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::UnmappedFile(_)
                | Self::CountMismatch { .. }
                | Self::Columnar(ColumnarError::MissingHeader(_))
        )
    }
}

/// One table's load in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLoad {
    /// Report the rows came from.
    pub report_type: ReportType,
    /// Destination table, without dataset.
    pub table: String,
    /// Rows appended.
    pub rows: usize,
}

/// Every table loaded in this run, in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Per-table loads.
    pub tables: Vec<TableLoad>,
}

impl LoadReport {
    /// Rows appended across all tables.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Validates and loads the files of one run.
pub struct IngestionPipeline<'a, L: WarehouseLoader + ?Sized> {
    loader: &'a mut L,
    mapping: &'a TableMapping,
    policy: RetryPolicy,
    loaded: BTreeMap<ReportType, TableLoad>,
}

impl<'a, L: WarehouseLoader + ?Sized> IngestionPipeline<'a, L> {
    /// Creates a pipeline that retries the batch with
    /// [`RetryPolicy::INGEST`].
    pub const fn new(loader: &'a mut L, mapping: &'a TableMapping) -> Self {
        Self {
            loader,
            mapping,
            policy: RetryPolicy::INGEST,
            loaded: BTreeMap::new(),
        }
    }

    /// Overrides the batch retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Loads every CSV in `dir`, which must be exactly the canonical files
    /// of `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UnmappedFile`] or
    /// [`IngestError::CountMismatch`] immediately without loading anything;
    /// other errors once the retry budget is exhausted.
    pub async fn run(
        &mut self,
        dir: &Path,
        expected: &[ReportType],
    ) -> Result<LoadReport, IngestError> {
        let policy = self.policy;
        log::info!(
            "Ingesting {} report(s) into {}",
            expected.len(),
            self.loader.dataset()
        );

        policy
            .run_or_raise("ingest", async || self.ingest_once(dir, expected))
            .await?;

        Ok(LoadReport {
            tables: self.loaded.values().cloned().collect(),
        })
    }

    fn ingest_once(&mut self, dir: &Path, expected: &[ReportType]) -> Result<(), IngestError> {
        let mut files = BTreeMap::new();
        for path in list_csv_files(dir)? {
            let name = file_name(&path);
            let report_type = self
                .mapping
                .resolve(&name)
                .ok_or(IngestError::UnmappedFile(name))?;

            if self.loaded.contains_key(&report_type) {
                log::warn!("  {} already loaded, removing leftover file", path.display());
                std::fs::remove_file(&path)?;
                continue;
            }
            files.insert(report_type, path);
        }

        let mut pending: Vec<ReportType> = expected
            .iter()
            .copied()
            .filter(|r| !self.loaded.contains_key(r))
            .collect();
        pending.sort();
        let found: Vec<ReportType> = files.keys().copied().collect();
        if pending != found {
            return Err(IngestError::CountMismatch {
                expected: pending,
                found,
            });
        }

        for (report_type, csv_path) in files {
            let load = self.load_file(report_type, &csv_path)?;
            self.loaded.insert(report_type, load);
            std::fs::remove_file(&csv_path)?;
        }
        Ok(())
    }

    fn load_file(
        &mut self,
        report_type: ReportType,
        csv_path: &Path,
    ) -> Result<TableLoad, IngestError> {
        let table = self.mapping.table_name(report_type);
        let parquet_path = csv_path.with_extension("parquet");

        let result = self.convert_and_append(&table, csv_path, &parquet_path);
        if parquet_path.exists()
            && let Err(e) = std::fs::remove_file(&parquet_path)
        {
            log::warn!("  could not remove {}: {e}", parquet_path.display());
        }
        let rows = result?;

        Ok(TableLoad {
            report_type,
            table,
            rows,
        })
    }

    fn convert_and_append(
        &mut self,
        table: &str,
        csv_path: &Path,
        parquet_path: &Path,
    ) -> Result<usize, IngestError> {
        let converted = convert_csv_to_parquet(csv_path, parquet_path)?;
        self.loader
            .append(&LoadRequest {
                table,
                columns: &converted.columns,
                parquet: parquet_path,
                rows: converted.rows,
            })
            .map_err(|source| IngestError::Load {
                table: table.to_owned(),
                source,
            })
    }
}

fn list_csv_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().is_some_and(|ext| ext == CSV_EXTENSION)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
