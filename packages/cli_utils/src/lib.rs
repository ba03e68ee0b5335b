#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Logger setup for the portal ingest binary.
//!
//! [`init_logger`] installs a `pretty_env_logger` formatter that writes
//! every line both to stderr and to a per-day file
//! (`scraper_YYYY-MM-DD.log`) in the log directory. Files older than
//! [`RETENTION_DAYS`] are pruned at start-up.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use env_logger::{Env, Target, WriteStyle};

/// Prefix of every log file name.
pub const LOG_FILE_PREFIX: &str = "scraper_";

/// Days a log file is kept.
pub const RETENTION_DAYS: i64 = 7;

/// Writes everything to stderr and to a file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Log file for `date` inside `log_dir`.
#[must_use]
pub fn daily_log_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("{LOG_FILE_PREFIX}{}.log", date.format("%Y-%m-%d")))
}

fn log_file_date(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(LOG_FILE_PREFIX)?.strip_suffix(".log")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Removes log files more than `retention_days` older than `today`.
///
/// Only files named like [`daily_log_path`] output are considered.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read or a file cannot
/// be removed.
pub fn prune_logs(
    log_dir: &Path,
    today: NaiveDate,
    retention_days: i64,
) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(date) = log_file_date(&name.to_string_lossy()) else {
            continue;
        };
        if (today - date).num_days() > retention_days {
            let path = entry.path();
            std::fs::remove_file(&path)?;
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}

/// Initializes the global logger.
///
/// Honours `RUST_LOG` (default `info`). Lines go to stderr and to today's
/// file in `log_dir`, which is created if needed. Expired files are
/// pruned first. Returns today's log file path.
///
/// # Errors
///
/// Returns an I/O error if the log directory or file cannot be created.
pub fn init_logger(log_dir: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;

    let today = Local::now().date_naive();
    let pruned = prune_logs(log_dir, today, RETENTION_DAYS)?;

    let path = daily_log_path(log_dir, today);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    pretty_env_logger::formatted_timed_builder()
        .parse_env(Env::new().filter_or("RUST_LOG", "info"))
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    for old in pruned {
        log::debug!("Removed expired log {}", old.display());
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn log_file_is_named_by_day() {
        assert_eq!(
            daily_log_path(Path::new("logs"), date("2024-03-09")),
            PathBuf::from("logs/scraper_2024-03-09.log")
        );
    }

    #[test]
    fn parses_only_dated_log_names() {
        assert_eq!(log_file_date("scraper_2024-03-09.log"), Some(date("2024-03-09")));
        assert_eq!(log_file_date("scraper_latest.log"), None);
        assert_eq!(log_file_date("other_2024-03-09.log"), None);
        assert_eq!(log_file_date("scraper_2024-03-09.txt"), None);
    }

    #[test]
    fn prune_removes_only_expired_scraper_logs() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "scraper_2024-03-01.log",
            "scraper_2024-03-02.log",
            "scraper_2024-03-09.log",
            "scraper_notes.log",
            "other_2024-01-01.log",
        ] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let removed = prune_logs(dir.path(), date("2024-03-09"), RETENTION_DAYS).unwrap();

        assert_eq!(removed, vec![dir.path().join("scraper_2024-03-01.log")]);
        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "other_2024-01-01.log",
                "scraper_2024-03-02.log",
                "scraper_2024-03-09.log",
                "scraper_notes.log",
            ]
        );
    }

    #[test]
    fn init_creates_todays_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let path = init_logger(&log_dir).unwrap();

        assert!(path.exists());
        assert!(path.starts_with(&log_dir));
    }
}
