//! One end-to-end run: browser up, warehouse open, login, download every
//! report, load them, clean up.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use futures::FutureExt as _;

use portal_ingest_models::{JobOutcome, ReportJob, ReportType, TableMapping};
use portal_ingest_portal::driver::{DriverError, DriverFactory, PortalDriver};
use portal_ingest_portal::orchestrator::{DownloadOrchestrator, OrchestratorError};
use portal_ingest_portal::session::{SessionError, SessionManager};
use portal_ingest_portal::watcher::LocalDirectory;
use portal_ingest_retry::RetryPolicy;
use portal_ingest_warehouse::{
    IngestError, IngestionPipeline, LoadError, LoadReport, WarehouseLoader,
};

use crate::config::Config;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The browser session could not be started.
    #[error("Browser setup failed: {0}")]
    Setup(#[source] DriverError),

    /// The warehouse could not be opened.
    #[error("Warehouse setup failed: {0}")]
    Warehouse(#[source] LoadError),

    /// Login never succeeded.
    #[error("Login failed: {0}")]
    Session(#[from] SessionError),

    /// A report could not be downloaded.
    #[error("Download failed: {0}")]
    Download(#[from] OrchestratorError),

    /// The downloaded reports could not be loaded.
    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    /// The download directory could not be prepared.
    #[error("Download directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// One outcome per report, in job order.
    pub outcomes: Vec<JobOutcome>,
    /// Tables appended to.
    pub load: LoadReport,
}

impl RunSummary {
    /// Reports that had no data for the period.
    #[must_use]
    pub fn empty_reports(&self) -> Vec<ReportType> {
        self.outcomes
            .iter()
            .filter(|o| o.file().is_none())
            .map(JobOutcome::report_type)
            .collect()
    }
}

/// Owns the download directory for the length of a run.
///
/// Creating it clears anything left by an earlier run; dropping it removes
/// the directory and its contents.
#[derive(Debug)]
pub struct DownloadDirGuard {
    path: PathBuf,
}

impl DownloadDirGuard {
    /// Creates `path` empty.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if stale contents cannot be removed or the
    /// directory cannot be created.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if path.exists() {
            log::warn!("Clearing leftover download directory {}", path.display());
            std::fs::remove_dir_all(path)?;
        }
        std::fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// The guarded directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DownloadDirGuard {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::error!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// Executes one run.
///
/// The browser session is always quit and the download directory always
/// removed, whatever the outcome. A panic in a stage is re-raised after
/// cleanup.
///
/// # Errors
///
/// Returns the [`RunError`] of the first stage that failed.
pub async fn execute<F, L, O>(
    config: &Config,
    factory: &F,
    open_warehouse: O,
) -> Result<RunSummary, RunError>
where
    F: DriverFactory,
    L: WarehouseLoader,
    O: FnMut() -> Result<L, LoadError>,
{
    let guard = DownloadDirGuard::new(&config.download_dir)?;
    let portal = config.portal_settings();
    let browser = config.browser_settings();
    let mut session = SessionManager::new(factory, &portal, &browser);

    let mut driver = session.acquire_driver().await.map_err(RunError::Setup)?;

    let result = AssertUnwindSafe(stages(
        config,
        &mut session,
        &mut driver,
        guard.path(),
        open_warehouse,
    ))
    .catch_unwind()
    .await;

    if let Err(e) = driver.quit().await {
        log::warn!("Failed to close browser session: {e}");
    }
    drop(guard);

    match result {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

async fn stages<F, L, O>(
    config: &Config,
    session: &mut SessionManager<'_, F>,
    driver: &mut F::Driver,
    download_dir: &Path,
    mut open_warehouse: O,
) -> Result<RunSummary, RunError>
where
    F: DriverFactory,
    L: WarehouseLoader,
    O: FnMut() -> Result<L, LoadError>,
{
    let mut warehouse = RetryPolicy::SETUP
        .run_or_raise("open warehouse", async || open_warehouse())
        .await
        .map_err(RunError::Warehouse)?;

    session.login(driver).await?;

    let portal = config.portal_settings();
    let directory = LocalDirectory::new(download_dir);
    let jobs = ReportJob::all_for(&config.date_range);
    let outcomes = DownloadOrchestrator::new(driver, &directory, &portal)
        .run(&jobs)
        .await?;

    let downloaded: Vec<ReportType> = outcomes
        .iter()
        .filter_map(JobOutcome::file)
        .map(|f| f.report_type)
        .collect();
    log::info!(
        "Downloaded {} of {} report(s)",
        downloaded.len(),
        outcomes.len()
    );

    let mapping = TableMapping::default();
    let load = IngestionPipeline::new(&mut warehouse, &mapping)
        .run(download_dir, &downloaded)
        .await?;

    Ok(RunSummary { outcomes, load })
}
