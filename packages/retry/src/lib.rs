#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bounded, fixed-delay retry policy.
//!
//! Every stage of a run wraps its fallible operations in a [`RetryPolicy`].
//! The delay between attempts is constant (never exponential), and the
//! caller picks one of two failure-signalling modes per call site:
//!
//! - [`RetryPolicy::run_or_raise`] hands the last error back once the
//!   budget is exhausted. Used where the caller must stop (setup, login,
//!   ingestion).
//! - [`RetryPolicy::run_or_flag`] logs the last error and returns `None`.
//!   Used for steady-state work where the caller decides what happens next.
//!
//! # Usage
//!
//! ```ignore
//! use portal_ingest_retry::RetryPolicy;
//!
//! let driver = RetryPolicy::SETUP
//!     .run_or_raise("acquire browser session", async || factory.create(&settings).await)
//!     .await?;
//!
//! let outcome = RetryPolicy::REPORT
//!     .run_or_flag("Relatório de Mídia", async || download(&mut driver).await)
//!     .await;
//! ```

use std::fmt::Display;
use std::time::Duration;

/// Classifies an error as worth another attempt or not.
///
/// Errors that describe the shape of the run (a missing file, a count
/// mismatch) should return `false` so the policy surfaces them after a
/// single attempt instead of burning the whole budget.
pub trait Retryable {
    /// Returns `true` if retrying the same operation could succeed.
    fn is_transient(&self) -> bool {
        true
    }
}

/// A bounded retry budget with a constant delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Browser and warehouse setup: environment problems show up fast.
    pub const SETUP: Self = Self::new(5, Duration::from_secs(5));

    /// Portal login. Slow and rare, so each attempt is minutes apart.
    pub const LOGIN: Self = Self::new(5, Duration::from_secs(5 * 60));

    /// One report job (generate, export, download, navigate back).
    pub const REPORT: Self = Self::new(5, Duration::from_secs(15));

    /// One ingestion batch (every downloaded file).
    pub const INGEST: Self = Self::new(5, Duration::from_secs(30));

    /// Creates a policy. A `max_attempts` of zero is treated as one.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            delay,
        }
    }

    /// Total number of times the operation may be invoked.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between two consecutive attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `op` until it succeeds, returns a non-transient error, or the
    /// budget is exhausted, in which case the last error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt, or the first non-transient
    /// error.
    pub async fn run_or_raise<T, E, F>(&self, label: &str, op: F) -> Result<T, E>
    where
        F: AsyncFnMut() -> Result<T, E>,
        E: Retryable + Display,
    {
        let result = self.execute(label, op).await;
        if let Err(e) = &result {
            log::error!("{label}: giving up: {e}");
        }
        result
    }

    /// Runs `op` like [`Self::run_or_raise`] but reports exhaustion as
    /// `None` instead of an error. The last error is logged.
    pub async fn run_or_flag<T, E, F>(&self, label: &str, op: F) -> Option<T>
    where
        F: AsyncFnMut() -> Result<T, E>,
        E: Retryable + Display,
    {
        match self.execute(label, op).await {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("{label}: failed, continuing without it: {e}");
                None
            }
        }
    }

    async fn execute<T, E, F>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: AsyncFnMut() -> Result<T, E>,
        E: Retryable + Display,
    {
        let mut state = RetryState::new(self.max_attempts);

        loop {
            state.attempt += 1;
            if state.attempt > 1 {
                log::info!(
                    "{label}: attempt {}/{} ({} remaining after this one)",
                    state.attempt,
                    self.max_attempts,
                    state.remaining(),
                );
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_transient() {
                        log::warn!("{label}: not retryable (attempt {})", state.attempt);
                        return Err(e);
                    }
                    if state.remaining() == 0 {
                        log::warn!("{label}: all {} attempts failed", self.max_attempts);
                        return Err(e);
                    }
                    log::warn!(
                        "{label}: attempt {}/{} failed: {e}; retrying in {:?}",
                        state.attempt,
                        self.max_attempts,
                        self.delay,
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

/// Per-invocation bookkeeping. Lives only inside one policy call.
struct RetryState {
    attempt: u32,
    budget: u32,
}

impl RetryState {
    const fn new(budget: u32) -> Self {
        Self { attempt: 0, budget }
    }

    const fn remaining(&self) -> u32 {
        self.budget.saturating_sub(self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use tokio::time::Instant;

    #[derive(Debug)]
    struct Flaky;

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("flaky")
        }
    }

    impl Retryable for Flaky {}

    #[derive(Debug)]
    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("broken")
        }
    }

    impl Retryable for Broken {
        fn is_transient(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_op_runs_exactly_max_attempts() {
        let policy = RetryPolicy::new(4, Duration::from_secs(10));
        let start = Instant::now();
        let mut calls = Vec::new();

        let result: Result<(), Flaky> = policy
            .run_or_raise("always fails", async || {
                calls.push(start.elapsed());
                Err(Flaky)
            })
            .await;

        assert!(result.is_err());
        assert_eq!(
            calls,
            vec![
                Duration::ZERO,
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30),
            ]
        );
        // No wait after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_value_once_an_attempt_succeeds() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let mut calls = 0u32;

        let result: Result<u32, Flaky> = policy
            .run_or_raise("third time lucky", async || {
                calls += 1;
                if calls < 3 { Err(Flaky) } else { Ok(calls) }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_is_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        let start = Instant::now();
        let mut calls = 0u32;

        let result: Result<(), Broken> = policy
            .run_or_raise("structural", async || {
                calls += 1;
                Err(Broken)
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn flag_mode_signals_exhaustion_with_none() {
        let policy = RetryPolicy::new(2, Duration::from_secs(15));
        let mut calls = 0u32;

        let outcome: Option<()> = policy
            .run_or_flag("report", async || {
                calls += 1;
                Err::<(), _>(Flaky)
            })
            .await;

        assert!(outcome.is_none());
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flag_mode_passes_value_through() {
        let outcome = RetryPolicy::REPORT
            .run_or_flag("report", async || Ok::<_, Flaky>("done"))
            .await;

        assert_eq!(outcome, Some("done"));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn named_tiers_escalate_login_delay() {
        assert!(RetryPolicy::LOGIN.delay() > RetryPolicy::REPORT.delay());
        assert!(RetryPolicy::REPORT.delay() > RetryPolicy::SETUP.delay());
    }
}
