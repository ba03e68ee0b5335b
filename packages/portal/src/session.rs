//! One authenticated browser session per run.
//!
//! Starting the browser fails for structural reasons (missing binary,
//! driver not listening) and is retried briefly. Logging in fails for
//! transient reasons (slow page, credential service hiccup) and is retried
//! with minutes between attempts: a login failure aborts the whole run, so
//! it is worth waiting for.

use portal_ingest_retry::{RetryPolicy, Retryable};

use crate::PortalSettings;
use crate::driver::{
    BrowserSettings, DriverError, DriverFactory, Locator, PortalDriver, require,
    require_and_click,
};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No login attempted yet.
    Unauthenticated,
    /// Login in progress (possibly on a retry).
    Authenticating,
    /// The post-login landmark was observed.
    Authenticated,
    /// Login retries exhausted. Terminal.
    Failed,
}

/// Errors from establishing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A browser command failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Credentials were submitted but the landing page never showed up.
    #[error("Login landmark {0} not observed after submitting credentials")]
    LandmarkMissing(Locator),
}

impl Retryable for SessionError {}

/// Builds the browser session and logs it into the portal.
pub struct SessionManager<'a, F: DriverFactory> {
    factory: &'a F,
    portal: &'a PortalSettings,
    browser: &'a BrowserSettings,
    setup_policy: RetryPolicy,
    login_policy: RetryPolicy,
    state: SessionState,
}

impl<'a, F: DriverFactory> SessionManager<'a, F> {
    /// Creates a manager using the standard setup and login retry tiers.
    #[must_use]
    pub const fn new(
        factory: &'a F,
        portal: &'a PortalSettings,
        browser: &'a BrowserSettings,
    ) -> Self {
        Self {
            factory,
            portal,
            browser,
            setup_policy: RetryPolicy::SETUP,
            login_policy: RetryPolicy::LOGIN,
            state: SessionState::Unauthenticated,
        }
    }

    /// Overrides the retry policies.
    #[must_use]
    pub const fn with_policies(mut self, setup: RetryPolicy, login: RetryPolicy) -> Self {
        self.setup_policy = setup;
        self.login_policy = login;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Starts a browser with the fixed run configuration.
    ///
    /// # Errors
    ///
    /// Returns the last [`DriverError`] once the setup budget is exhausted.
    pub async fn acquire_driver(&self) -> Result<F::Driver, DriverError> {
        let factory = self.factory;
        let browser = self.browser;
        log::info!(
            "Starting browser (downloads -> {})",
            browser.download_dir.display()
        );
        self.setup_policy
            .run_or_raise("start browser session", async || factory.create(browser).await)
            .await
    }

    /// Logs `driver` into the portal.
    ///
    /// # Errors
    ///
    /// Returns the last [`SessionError`] once the login budget is
    /// exhausted; the session is then [`SessionState::Failed`].
    pub async fn login<D: PortalDriver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Result<(), SessionError> {
        let portal = self.portal;
        self.transition(SessionState::Authenticating);

        let result = self
            .login_policy
            .run_or_raise("login", async || login_once(&mut *driver, portal).await)
            .await;

        match result {
            Ok(()) => {
                self.transition(SessionState::Authenticated);
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("Session state {:?} -> {next:?}", self.state);
        self.state = next;
    }
}

async fn login_once<D: PortalDriver + ?Sized>(
    driver: &mut D,
    portal: &PortalSettings,
) -> Result<(), SessionError> {
    let locators = &portal.locators;
    let wait = portal.timings.element_wait;

    driver.navigate(&portal.login_url).await?;

    require(driver, &locators.username_field, wait).await?;
    driver
        .type_text(&locators.username_field, &portal.credentials.username)
        .await?;
    driver
        .type_text(&locators.password_field, portal.credentials.password())
        .await?;
    require_and_click(driver, &locators.submit_button, wait).await?;

    if !driver.wait_for(&locators.nav_toggle, wait).await? {
        return Err(SessionError::LandmarkMissing(locators.nav_toggle.clone()));
    }

    log::info!("Logged in as {}", portal.credentials.username);
    Ok(())
}
