//! Download completion detection.
//!
//! Browsers write a download under a partial name (`.crdownload`, `.tmp`,
//! `.part`) and rename it when done, but a directory listing can still
//! observe the final name mid-write. [`DownloadWatcher::poll`] therefore
//! requires three things before it reports a file complete:
//!
//! 1. a file with the target extension that was not in the "before"
//!    [`DownloadSnapshot`],
//! 2. no partial-marker file anywhere in the directory,
//! 3. two equal, non-zero size samples of the newest candidate taken
//!    [`DownloadWatcher::with_sample_interval`] apart.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use portal_ingest_retry::Retryable;

/// Extensions browsers use for downloads that are still being written.
pub const PARTIAL_MARKERS: &[&str] = &["crdownload", "tmp", "part"];

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name (no directory component).
    pub name: String,
    /// Last modification time, used to pick the newest candidate.
    pub modified: SystemTime,
}

/// Read and rename access to the download directory.
pub trait DownloadDirectory: Send + Sync {
    /// The directory's location on disk.
    fn path(&self) -> &Path;

    /// Lists regular files in the directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read.
    fn list(&self) -> std::io::Result<Vec<DirEntry>>;

    /// Current size in bytes of the file called `name`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file is missing or unreadable.
    fn size_of(&self, name: &str) -> std::io::Result<u64>;

    /// Renames `from` to `to`, replacing any existing `to`, and returns the
    /// new path.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the rename fails.
    fn rename(&self, from: &str, to: &str) -> std::io::Result<PathBuf>;
}

/// [`DownloadDirectory`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    /// Wraps an existing directory.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl DownloadDirectory for LocalDirectory {
    fn path(&self) -> &Path {
        &self.root
    }

    fn list(&self) -> std::io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                modified,
            });
        }
        Ok(entries)
    }

    fn size_of(&self, name: &str) -> std::io::Result<u64> {
        Ok(std::fs::metadata(self.root.join(name))?.len())
    }

    fn rename(&self, from: &str, to: &str) -> std::io::Result<PathBuf> {
        let target = self.root.join(to);
        if target.exists() {
            std::fs::remove_file(&target)?;
        }
        std::fs::rename(self.root.join(from), &target)?;
        Ok(target)
    }
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn is_partial(name: &str) -> bool {
    PARTIAL_MARKERS
        .iter()
        .any(|marker| has_extension(name, marker))
}

/// File names with a given extension present at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSnapshot {
    names: BTreeSet<String>,
}

impl DownloadSnapshot {
    /// Lists `dir` and keeps the names ending in `.{extension}`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be listed.
    pub fn capture<D: DownloadDirectory + ?Sized>(
        dir: &D,
        extension: &str,
    ) -> std::io::Result<Self> {
        Ok(Self::from_names(
            dir.list()?
                .into_iter()
                .map(|entry| entry.name)
                .filter(|name| has_extension(name, extension)),
        ))
    }

    /// Builds a snapshot from an explicit list of names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Names in `self` that were not in `before`.
    #[must_use]
    pub fn new_since(&self, before: &Self) -> BTreeSet<String> {
        self.names.difference(&before.names).cloned().collect()
    }

    /// Whether `name` is part of the snapshot.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of names in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Why a poll did not report completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingReason {
    /// No new file with the target extension yet.
    NoNewFile,
    /// A partial-marker file exists; the browser is still writing.
    InProgress(String),
    /// The candidate's two size samples differed or were zero.
    Unstable {
        /// Candidate file name.
        name: String,
        /// First size sample.
        first: u64,
        /// Second size sample.
        second: u64,
    },
    /// The directory or candidate could not be read this time around.
    Unreadable(String),
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStatus {
    /// Not done yet.
    Pending(PendingReason),
    /// The named file finished downloading.
    Complete(String),
}

/// Errors from waiting on a download.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// No completed file appeared within the bound.
    #[error("Download did not complete within {0:?}")]
    Timeout(Duration),
}

impl Retryable for WatchError {}

/// Decides when exactly one new download has finished writing.
#[derive(Debug)]
pub struct DownloadWatcher<'a, D: DownloadDirectory + ?Sized> {
    dir: &'a D,
    extension: String,
    sample_interval: Duration,
    poll_interval: Duration,
}

impl<'a, D: DownloadDirectory + ?Sized> DownloadWatcher<'a, D> {
    /// Watches `dir` for files ending in `.{extension}`, sampling sizes
    /// one second apart and polling twice a second.
    #[must_use]
    pub fn new(dir: &'a D, extension: &str) -> Self {
        Self {
            dir,
            extension: extension.to_owned(),
            sample_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Sets the gap between the two size samples.
    #[must_use]
    pub const fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Sets the gap between polls in [`Self::wait_for_completion`].
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Checks the directory once.
    pub async fn poll(&self, before: &DownloadSnapshot) -> WatchStatus {
        let entries = match self.dir.list() {
            Ok(entries) => entries,
            Err(e) => return WatchStatus::Pending(PendingReason::Unreadable(e.to_string())),
        };

        let current = DownloadSnapshot::from_names(
            entries
                .iter()
                .map(|entry| entry.name.as_str())
                .filter(|name| has_extension(name, &self.extension)),
        );
        let new_files = current.new_since(before);
        if new_files.is_empty() {
            return WatchStatus::Pending(PendingReason::NoNewFile);
        }

        if let Some(partial) = entries.iter().find(|entry| is_partial(&entry.name)) {
            return WatchStatus::Pending(PendingReason::InProgress(partial.name.clone()));
        }

        let Some(candidate) = entries
            .iter()
            .filter(|entry| new_files.contains(&entry.name))
            .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
        else {
            return WatchStatus::Pending(PendingReason::NoNewFile);
        };

        let first = match self.dir.size_of(&candidate.name) {
            Ok(size) => size,
            Err(e) => return WatchStatus::Pending(PendingReason::Unreadable(e.to_string())),
        };
        tokio::time::sleep(self.sample_interval).await;
        let second = match self.dir.size_of(&candidate.name) {
            Ok(size) => size,
            Err(e) => return WatchStatus::Pending(PendingReason::Unreadable(e.to_string())),
        };

        if first == second && first > 0 {
            WatchStatus::Complete(candidate.name.clone())
        } else {
            WatchStatus::Pending(PendingReason::Unstable {
                name: candidate.name.clone(),
                first,
                second,
            })
        }
    }

    /// Polls until a new file completes or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Timeout`] if nothing completes in time.
    pub async fn wait_for_completion(
        &self,
        before: &DownloadSnapshot,
        timeout: Duration,
    ) -> Result<String, WatchError> {
        let wait = async {
            loop {
                match self.poll(before).await {
                    WatchStatus::Complete(name) => return name,
                    WatchStatus::Pending(reason) => {
                        log::debug!("Download pending: {reason:?}");
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| WatchError::Timeout(timeout))
    }
}
