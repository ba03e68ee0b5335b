//! Run configuration, read once from the environment.

use std::path::PathBuf;

use portal_ingest_portal::driver::BrowserSettings;
use portal_ingest_portal::webdriver::DEFAULT_ENDPOINT;
use portal_ingest_portal::{Credentials, DEFAULT_LOGIN_URL, PortalSettings};

/// Default date-range option: yesterday.
pub const DEFAULT_DATE_RANGE: &str = "Ontem";
/// Default browser executable.
pub const DEFAULT_BROWSER_BINARY: &str = "/usr/bin/chromium";
/// Default download directory.
pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/scraper";
/// Default log directory.
pub const DEFAULT_LOG_DIR: &str = "logs";
/// Default directory holding the warehouse database.
pub const DEFAULT_WAREHOUSE_DIR: &str = "data";

/// Errors from reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
}

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct Config {
    /// Warehouse project; names the database file.
    pub project_id: String,
    /// Warehouse dataset; names the schema tables live in.
    pub dataset_id: String,
    /// Portal account.
    pub credentials: Credentials,
    /// Portal login page.
    pub login_url: String,
    /// Date-range option selected for every report.
    pub date_range: String,
    /// WebDriver server endpoint.
    pub webdriver_url: String,
    /// Browser executable. `None` lets the driver pick.
    pub browser_binary: Option<PathBuf>,
    /// Temporary directory downloads land in.
    pub download_dir: PathBuf,
    /// Directory for daily log files.
    pub log_dir: PathBuf,
    /// Directory holding the warehouse database file.
    pub warehouse_dir: PathBuf,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for the first required variable
    /// that is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for the first required variable
    /// that is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_owned());

        let project_id = required("WAREHOUSE_PROJECT_ID")?;
        let dataset_id = required("WAREHOUSE_DATASET_ID")?;
        let username = required("PORTAL_USERNAME")?;
        let password = required("PORTAL_PASSWORD")?;

        let browser_binary = match lookup("BROWSER_BINARY") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(PathBuf::from(DEFAULT_BROWSER_BINARY)),
        };

        Ok(Self {
            project_id,
            dataset_id,
            credentials: Credentials::new(&username, &password),
            login_url: or_default("PORTAL_LOGIN_URL", DEFAULT_LOGIN_URL),
            date_range: or_default("PORTAL_DATE_RANGE", DEFAULT_DATE_RANGE),
            webdriver_url: or_default("WEBDRIVER_URL", DEFAULT_ENDPOINT),
            browser_binary,
            download_dir: or_default("DOWNLOAD_DIR", DEFAULT_DOWNLOAD_DIR).into(),
            log_dir: or_default("LOG_DIR", DEFAULT_LOG_DIR).into(),
            warehouse_dir: or_default("WAREHOUSE_DIR", DEFAULT_WAREHOUSE_DIR).into(),
        })
    }

    /// Replaces the date range if `date_range` is given.
    #[must_use]
    pub fn with_date_range(mut self, date_range: Option<String>) -> Self {
        if let Some(date_range) = date_range {
            self.date_range = date_range;
        }
        self
    }

    /// The `DuckDB` file for this project.
    #[must_use]
    pub fn warehouse_path(&self) -> PathBuf {
        self.warehouse_dir.join(format!("{}.duckdb", self.project_id))
    }

    /// Portal login and navigation settings.
    #[must_use]
    pub fn portal_settings(&self) -> PortalSettings {
        PortalSettings::new(&self.login_url, self.credentials.clone())
    }

    /// Fixed browser settings for this run.
    #[must_use]
    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings::fixed(self.download_dir.clone(), self.browser_binary.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("WAREHOUSE_PROJECT_ID", "afiliados"),
        ("WAREHOUSE_DATASET_ID", "portal"),
        ("PORTAL_USERNAME", "afiliado"),
        ("PORTAL_PASSWORD", "segredo"),
    ];

    #[test]
    fn required_only_fills_defaults() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.date_range, "Ontem");
        assert_eq!(config.login_url, DEFAULT_LOGIN_URL);
        assert_eq!(config.webdriver_url, "http://localhost:9515");
        assert_eq!(config.download_dir, PathBuf::from("/tmp/scraper"));
        assert_eq!(config.browser_binary, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(config.warehouse_path(), PathBuf::from("data/afiliados.duckdb"));
        assert_eq!(config.credentials.password(), "segredo");
    }

    #[test]
    fn reports_first_missing_required_variable() {
        let err = Config::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PORTAL_USERNAME")));
    }

    #[test]
    fn empty_required_value_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars[0] = ("WAREHOUSE_PROJECT_ID", "  ");
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("WAREHOUSE_PROJECT_ID")));
    }

    #[test]
    fn empty_browser_binary_defers_to_driver() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("BROWSER_BINARY", ""));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.browser_binary, None);
    }

    #[test]
    fn cli_date_range_overrides_environment() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PORTAL_DATE_RANGE", "Hoje"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.date_range, "Hoje");

        let config = config.with_date_range(Some("Últimos 7 dias".to_owned()));
        assert_eq!(config.date_range, "Últimos 7 dias");
    }

    #[test]
    fn debug_output_hides_password() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert!(!format!("{config:?}").contains("segredo"));
    }
}
