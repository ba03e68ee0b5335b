//! The browser capability the orchestration core drives.
//!
//! [`PortalDriver`] is deliberately narrow: navigate, click, type, pick a
//! select option, wait for an element, scroll, quit. Anything richer stays
//! inside a concrete implementation such as
//! [`crate::webdriver::WebDriverSession`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use portal_ingest_retry::Retryable;

/// How to find an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Element `id` attribute.
    Id(String),
    /// Element `name` attribute.
    Name(String),
    /// A single CSS class name.
    ClassName(String),
    /// Exact visible text of a link.
    LinkText(String),
    /// Element tag name.
    TagName(String),
    /// Arbitrary `XPath` expression.
    XPath(String),
}

impl Locator {
    /// A `<button>` whose visible text contains the whole `label`.
    ///
    /// Matches on the full label, so copy changes to unrelated buttons
    /// sharing a first letter cannot be picked up by accident.
    #[must_use]
    pub fn button_labelled(label: &str) -> Self {
        Self::XPath(format!(
            "//button[contains(normalize-space(.), {})]",
            xpath_literal(label)
        ))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(v) => write!(f, "id={v}"),
            Self::Name(v) => write!(f, "name={v}"),
            Self::ClassName(v) => write!(f, "class={v}"),
            Self::LinkText(v) => write!(f, "link={v}"),
            Self::TagName(v) => write!(f, "tag={v}"),
            Self::XPath(v) => write!(f, "xpath={v}"),
        }
    }
}

/// Quotes a string for use as an `XPath` 1.0 literal.
///
/// `XPath` 1.0 has no escape sequences, so a value containing both quote
/// characters has to be stitched together with `concat()`.
#[must_use]
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Errors raised while driving the browser.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The WebDriver endpoint could not be reached or answered garbage.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The WebDriver endpoint reported a command failure.
    #[error("WebDriver error '{error}': {message}")]
    WebDriver {
        /// W3C error code, e.g. `no such element`.
        error: String,
        /// Human-readable detail from the browser.
        message: String,
    },

    /// An element did not appear within its wait bound.
    #[error("Element not found: {0}")]
    ElementNotFound(Locator),

    /// A `select` did not offer the requested option.
    #[error("Option '{option}' not found in {locator}")]
    OptionNotFound {
        /// The `select` that was searched.
        locator: Locator,
        /// The visible text that was looked for.
        option: String,
    },

    /// The WebDriver response did not have the expected shape.
    #[error("Unexpected WebDriver response: {0}")]
    Protocol(String),

    /// A command was issued after the session was closed.
    #[error("Browser session is closed")]
    SessionClosed,
}

// Timing, DOM-readiness, and transport problems are all worth retrying.
impl Retryable for DriverError {}

/// Browser-level operations on a single page.
///
/// One instance is one browser session; it is driven strictly
/// sequentially.
#[async_trait]
pub trait PortalDriver: Send {
    /// Loads `url` in the current tab.
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Clicks the first element matching `locator`.
    async fn click(&mut self, locator: &Locator) -> Result<(), DriverError>;

    /// Types `text` into the first element matching `locator`.
    async fn type_text(&mut self, locator: &Locator, text: &str) -> Result<(), DriverError>;

    /// Picks the option with visible text `visible_text` in a `select`.
    async fn select_option(
        &mut self,
        locator: &Locator,
        visible_text: &str,
    ) -> Result<(), DriverError>;

    /// Waits up to `timeout` for an element matching `locator` to exist.
    ///
    /// Returns `Ok(false)` when the timeout elapses. A zero timeout checks
    /// exactly once.
    async fn wait_for(&mut self, locator: &Locator, timeout: Duration)
    -> Result<bool, DriverError>;

    /// Scrolls the page back to the top.
    async fn scroll_to_top(&mut self) -> Result<(), DriverError>;

    /// Ends the browser session. Calling it twice is a no-op.
    async fn quit(&mut self) -> Result<(), DriverError>;
}

/// Waits for `locator` and fails with [`DriverError::ElementNotFound`] if
/// it never shows up.
///
/// # Errors
///
/// Returns [`DriverError`] if the wait fails or the element is absent.
pub async fn require<D: PortalDriver + ?Sized>(
    driver: &mut D,
    locator: &Locator,
    timeout: Duration,
) -> Result<(), DriverError> {
    if driver.wait_for(locator, timeout).await? {
        Ok(())
    } else {
        Err(DriverError::ElementNotFound(locator.clone()))
    }
}

/// Waits for `locator` and clicks it.
///
/// # Errors
///
/// Returns [`DriverError`] if the element never appears or the click fails.
pub async fn require_and_click<D: PortalDriver + ?Sized>(
    driver: &mut D,
    locator: &Locator,
    timeout: Duration,
) -> Result<(), DriverError> {
    require(driver, locator, timeout).await?;
    driver.click(locator).await
}

/// Fixed browser configuration for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    /// Run without a visible window.
    pub headless: bool,
    /// Disable the browser sandbox (needed inside containers).
    pub disable_sandbox: bool,
    /// Directory downloads are written to, without prompting.
    pub download_dir: PathBuf,
    /// Browser executable, if not the driver's default.
    pub binary: Option<PathBuf>,
}

impl BrowserSettings {
    /// The deterministic configuration every run uses: headless, sandbox
    /// disabled, downloads into `download_dir`.
    #[must_use]
    pub const fn fixed(download_dir: PathBuf, binary: Option<PathBuf>) -> Self {
        Self {
            headless: true,
            disable_sandbox: true,
            download_dir,
            binary,
        }
    }

    /// Command-line switches passed to Chromium.
    #[must_use]
    pub fn chrome_args(&self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.headless {
            args.push("--headless=new");
        }
        if self.disable_sandbox {
            args.push("--no-sandbox");
        }
        args.push("--disable-dev-shm-usage");
        args.push("--disable-gpu");
        args
    }
}

/// Creates browser sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// The session type produced.
    type Driver: PortalDriver;

    /// Starts a new browser session configured by `settings`.
    async fn create(&self, settings: &BrowserSettings) -> Result<Self::Driver, DriverError>;
}
