#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Acquisition half of a run: log into the portal, then download every
//! report one after another.
//!
//! The browser is only reached through the [`driver::PortalDriver`] trait,
//! and the download directory through [`watcher::DownloadDirectory`], so
//! the session, watcher, and orchestrator logic run unchanged against
//! the [`webdriver`] client or against in-memory fakes.

pub mod driver;
pub mod orchestrator;
pub mod session;
pub mod watcher;
pub mod webdriver;

#[cfg(test)]
mod fake;

use std::fmt;
use std::time::Duration;

use portal_ingest_models::ReportType;

use crate::driver::Locator;

/// Default login page of the affiliate portal.
pub const DEFAULT_LOGIN_URL: &str = "https://afiliado.supremaposta.com/login";

/// Portal account used to log in.
#[derive(Clone)]
pub struct Credentials {
    /// Account user name.
    pub username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }

    /// The account password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where things are on the portal's pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalLocators {
    /// Login form user name input.
    pub username_field: Locator,
    /// Login form password input.
    pub password_field: Locator,
    /// Login form submit button.
    pub submit_button: Locator,
    /// Navigation toggle; its presence is the post-login landmark.
    pub nav_toggle: Locator,
    /// Link to the reports landing page inside the navigation.
    pub reports_link: Locator,
    /// The date-range `select` on a report page.
    pub date_range_select: Locator,
    /// Button that generates the report for the selected period.
    pub generate_button: Locator,
    /// Button that exports the generated report. Absent when there is no data.
    pub export_button: Locator,
}

impl PortalLocators {
    /// Link that opens a given report from the reports landing page.
    #[must_use]
    pub fn report_link(&self, report_type: ReportType) -> Locator {
        Locator::LinkText(report_type.label().to_owned())
    }
}

impl Default for PortalLocators {
    fn default() -> Self {
        Self {
            username_field: Locator::Name("user".to_owned()),
            password_field: Locator::Name("password".to_owned()),
            submit_button: Locator::ClassName("submit-btn".to_owned()),
            nav_toggle: Locator::Id("mobileToggle".to_owned()),
            reports_link: Locator::LinkText("Relatórios".to_owned()),
            date_range_select: Locator::TagName("select".to_owned()),
            generate_button: Locator::button_labelled("Gerar relatório"),
            export_button: Locator::button_labelled("Exportar relatório"),
        }
    }
}

/// Every wait and pause used while driving the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalTimings {
    /// Default bound for an element to appear (login form, selects, nav).
    pub element_wait: Duration,
    /// Bound for a report link to become available.
    pub report_link_wait: Duration,
    /// Bound for the generate button to appear.
    pub generate_wait: Duration,
    /// Bound for the export button to become clickable once present.
    pub export_wait: Duration,
    /// Pause after clicking generate before checking for export.
    pub generate_settle: Duration,
    /// Total bound on a single file download.
    pub download_timeout: Duration,
    /// Pause after a download completes, before renaming it.
    pub download_settle: Duration,
    /// Pause after scrolling so the page stops moving.
    pub scroll_settle: Duration,
    /// Gap between the two size samples of a candidate download.
    pub sample_interval: Duration,
    /// Gap between two download-directory polls.
    pub poll_interval: Duration,
}

impl Default for PortalTimings {
    fn default() -> Self {
        Self {
            element_wait: Duration::from_secs(10),
            report_link_wait: Duration::from_secs(20),
            generate_wait: Duration::from_secs(15),
            export_wait: Duration::from_secs(30),
            generate_settle: Duration::from_secs(2),
            download_timeout: Duration::from_secs(2 * 60),
            download_settle: Duration::from_secs(2),
            scroll_settle: Duration::from_millis(500),
            sample_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Everything the session manager and orchestrator need to know about
/// the portal.
#[derive(Debug, Clone)]
pub struct PortalSettings {
    /// Login page URL.
    pub login_url: String,
    /// Account to log in with.
    pub credentials: Credentials,
    /// Page element locators.
    pub locators: PortalLocators,
    /// Waits and pauses.
    pub timings: PortalTimings,
}

impl PortalSettings {
    /// Settings for the default portal with the given credentials.
    #[must_use]
    pub fn new(login_url: &str, credentials: Credentials) -> Self {
        Self {
            login_url: login_url.to_owned(),
            credentials,
            locators: PortalLocators::default(),
            timings: PortalTimings::default(),
        }
    }
}
