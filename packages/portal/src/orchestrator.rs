//! Sequential download of every report for one date range.
//!
//! Each job goes: report link, date range, generate, export, wait for the
//! file, rename it, back to the report list. A report without data shows
//! no export button; that is a successful [`JobOutcome::NoData`]. A job
//! that keeps failing past its retry budget aborts the run.

use std::time::Duration;

use portal_ingest_models::{CSV_EXTENSION, CompletedFile, JobOutcome, ReportJob, ReportType};
use portal_ingest_retry::{RetryPolicy, Retryable};

use crate::PortalSettings;
use crate::driver::{DriverError, PortalDriver, require, require_and_click};
use crate::watcher::{DownloadDirectory, DownloadSnapshot, DownloadWatcher, WatchError};

/// Errors from downloading reports.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A browser command failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The download never finished.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// The download directory could not be read or the file renamed.
    #[error("Download directory error: {0}")]
    Io(#[from] std::io::Error),

    /// A report kept failing until its retry budget ran out.
    #[error("Report {report} failed after exhausting its retries")]
    JobFailed {
        /// The report that failed.
        report: ReportType,
    },
}

impl Retryable for OrchestratorError {
    fn is_transient(&self) -> bool {
        !matches!(self, Self::JobFailed { .. })
    }
}

/// Drives a logged-in browser through every report job in order.
pub struct DownloadOrchestrator<'a, D: PortalDriver + ?Sized, R: DownloadDirectory + ?Sized> {
    driver: &'a mut D,
    dir: &'a R,
    settings: &'a PortalSettings,
    policy: RetryPolicy,
}

impl<'a, D: PortalDriver + ?Sized, R: DownloadDirectory + ?Sized> DownloadOrchestrator<'a, D, R> {
    /// Creates an orchestrator that retries each job with
    /// [`RetryPolicy::REPORT`].
    pub const fn new(driver: &'a mut D, dir: &'a R, settings: &'a PortalSettings) -> Self {
        Self {
            driver,
            dir,
            settings,
            policy: RetryPolicy::REPORT,
        }
    }

    /// Overrides the per-job retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs every job in order and returns one outcome per job.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::JobFailed`] for the first job whose
    /// retries are exhausted; later jobs are not attempted. Returns the
    /// underlying error if the report list cannot be opened.
    pub async fn run(&mut self, jobs: &[ReportJob]) -> Result<Vec<JobOutcome>, OrchestratorError> {
        let policy = self.policy;

        policy
            .run_or_raise("open reports", async || self.open_reports().await)
            .await?;

        let mut outcomes = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.iter().enumerate() {
            let label = job.report_type.label();
            log::info!(
                "[{}/{}] {label} ({})",
                index + 1,
                jobs.len(),
                job.date_range
            );

            let Some(outcome) = policy
                .run_or_flag(label, async || self.download_report(job).await)
                .await
            else {
                return Err(OrchestratorError::JobFailed {
                    report: job.report_type,
                });
            };

            match &outcome {
                JobOutcome::Downloaded(file) => {
                    log::info!("  downloaded {}", file.path.display());
                }
                JobOutcome::NoData(_) => log::info!("  no data for {}", job.date_range),
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    async fn open_reports(&mut self) -> Result<(), DriverError> {
        let settings = self.settings;
        let locators = &settings.locators;
        let wait = settings.timings.element_wait;
        require_and_click(self.driver, &locators.nav_toggle, wait).await?;
        require_and_click(self.driver, &locators.reports_link, wait).await
    }

    async fn download_report(&mut self, job: &ReportJob) -> Result<JobOutcome, OrchestratorError> {
        let settings = self.settings;
        let locators = &settings.locators;
        let timings = &settings.timings;

        let before = DownloadSnapshot::capture(self.dir, CSV_EXTENSION)?;

        require_and_click(
            self.driver,
            &locators.report_link(job.report_type),
            timings.report_link_wait,
        )
        .await?;
        require(self.driver, &locators.date_range_select, timings.element_wait).await?;
        self.driver
            .select_option(&locators.date_range_select, &job.date_range)
            .await?;
        require_and_click(self.driver, &locators.generate_button, timings.generate_wait).await?;

        tokio::time::sleep(timings.generate_settle).await;

        if !self
            .driver
            .wait_for(&locators.export_button, Duration::ZERO)
            .await?
        {
            self.navigate_back().await?;
            return Ok(JobOutcome::NoData(job.report_type));
        }

        require_and_click(self.driver, &locators.export_button, timings.export_wait).await?;

        let watcher = DownloadWatcher::new(self.dir, CSV_EXTENSION)
            .with_sample_interval(timings.sample_interval)
            .with_poll_interval(timings.poll_interval);
        let downloaded = watcher
            .wait_for_completion(&before, timings.download_timeout)
            .await?;

        tokio::time::sleep(timings.download_settle).await;

        let canonical = job.report_type.canonical_file_name();
        let path = self.dir.rename(&downloaded, &canonical)?;
        log::debug!("  {downloaded} -> {canonical}");

        self.navigate_back().await?;

        Ok(JobOutcome::Downloaded(CompletedFile {
            path,
            report_type: job.report_type,
        }))
    }

    async fn navigate_back(&mut self) -> Result<(), DriverError> {
        let settings = self.settings;
        let locators = &settings.locators;
        let timings = &settings.timings;

        self.driver.scroll_to_top().await?;
        tokio::time::sleep(timings.scroll_settle).await;
        require_and_click(self.driver, &locators.nav_toggle, timings.element_wait).await?;
        require_and_click(self.driver, &locators.reports_link, timings.element_wait).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::driver::Locator;
    use crate::fake::{FakeDirectory, FakeDriver};
    use crate::{Credentials, DEFAULT_LOGIN_URL};

    fn settings() -> PortalSettings {
        PortalSettings::new(DEFAULT_LOGIN_URL, Credentials::new("afiliado", "segredo"))
    }

    #[tokio::test(start_paused = true)]
    async fn downloads_and_renames_every_report() {
        let settings = settings();
        let dir = Arc::new(FakeDirectory::new());
        let mut driver = FakeDriver::new().logged_in().with_directory(Arc::clone(&dir));

        let outcomes = DownloadOrchestrator::new(&mut driver, &*dir, &settings)
            .run(&ReportJob::all_for("Ontem"))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 4);
        for (outcome, report_type) in outcomes.iter().zip(ReportType::ALL) {
            let file = outcome.file().unwrap();
            assert_eq!(file.report_type, report_type);
            assert_eq!(
                file.path,
                dir.path().join(report_type.canonical_file_name())
            );
        }
        assert_eq!(
            dir.names(),
            vec!["atividades.csv", "ganhos.csv", "midia.csv", "registros.csv"]
        );
        assert_eq!(driver.count("select Ontem"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn report_without_export_is_no_data_and_not_retried() {
        let settings = settings();
        let dir = Arc::new(FakeDirectory::new());
        let mut driver = FakeDriver::new()
            .logged_in()
            .with_directory(Arc::clone(&dir))
            .without_data(ReportType::Ganhos);

        let outcomes = DownloadOrchestrator::new(&mut driver, &*dir, &settings)
            .run(&ReportJob::all_for("Ontem"))
            .await
            .unwrap();

        assert_eq!(outcomes[2], JobOutcome::NoData(ReportType::Ganhos));
        assert!(outcomes[3].file().is_some());
        assert_eq!(
            driver.count(&format!("click {}", settings.locators.generate_button)),
            4
        );
        assert_eq!(
            driver.count(&format!("click {}", settings.locators.export_button)),
            3
        );
        assert!(!dir.names().contains(&"ganhos.csv".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_job_aborts_before_later_reports() {
        let settings = settings();
        let dir = Arc::new(FakeDirectory::new());
        let registros = settings.locators.report_link(ReportType::Registros);
        let mut driver = FakeDriver::new()
            .logged_in()
            .with_directory(Arc::clone(&dir))
            .missing(registros);

        let result = DownloadOrchestrator::new(&mut driver, &*dir, &settings)
            .with_policy(RetryPolicy::new(2, Duration::from_secs(15)))
            .run(&ReportJob::all_for("Ontem"))
            .await;

        assert!(matches!(
            result,
            Err(OrchestratorError::JobFailed {
                report: ReportType::Registros
            })
        ));
        let ganhos = Locator::LinkText(ReportType::Ganhos.label().to_owned());
        let atividades = Locator::LinkText(ReportType::Atividades.label().to_owned());
        assert_eq!(driver.count(&format!("click {ganhos}")), 0);
        assert_eq!(driver.count(&format!("click {atividades}")), 0);
        assert_eq!(dir.names(), vec!["midia.csv"]);
    }

    #[test]
    fn job_failure_is_not_transient() {
        let err = OrchestratorError::JobFailed {
            report: ReportType::Midia,
        };
        assert!(!err.is_transient());
        let timeout = WatchError::Timeout(Duration::from_secs(1));
        assert!(OrchestratorError::Watch(timeout).is_transient());
    }
}
