//! In-memory stand-ins for the browser and the download directory.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use portal_ingest_models::ReportType;

use crate::PortalLocators;
use crate::driver::{BrowserSettings, DriverError, DriverFactory, Locator, PortalDriver};
use crate::watcher::{DirEntry, DownloadDirectory};

struct FakeFile {
    /// Successive size samples; the last one repeats forever.
    sizes: VecDeque<u64>,
    modified: SystemTime,
}

#[derive(Default)]
struct DirState {
    files: BTreeMap<String, FakeFile>,
    clock: u64,
}

pub struct FakeDirectory {
    root: PathBuf,
    state: Mutex<DirState>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/fake/downloads"),
            state: Mutex::new(DirState::default()),
        }
    }

    /// Adds a file whose size reads as `sizes[0]`, `sizes[1]`, ... on
    /// successive samples. Each added file is newer than the last.
    pub fn add_file(&self, name: &str, sizes: &[u64]) {
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(state.clock);
        state.files.insert(
            name.to_owned(),
            FakeFile {
                sizes: sizes.iter().copied().collect(),
                modified,
            },
        );
    }

    pub fn remove(&self, name: &str) {
        self.state.lock().unwrap().files.remove(name);
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }
}

fn not_found(name: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, name.to_owned())
}

impl DownloadDirectory for FakeDirectory {
    fn path(&self) -> &Path {
        &self.root
    }

    fn list(&self) -> std::io::Result<Vec<DirEntry>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .iter()
            .map(|(name, file)| DirEntry {
                name: name.clone(),
                modified: file.modified,
            })
            .collect())
    }

    fn size_of(&self, name: &str) -> std::io::Result<u64> {
        let mut state = self.state.lock().unwrap();
        let file = state.files.get_mut(name).ok_or_else(|| not_found(name))?;
        let size = if file.sizes.len() > 1 {
            file.sizes.pop_front()
        } else {
            file.sizes.front().copied()
        };
        Ok(size.unwrap_or(0))
    }

    fn rename(&self, from: &str, to: &str) -> std::io::Result<PathBuf> {
        let mut state = self.state.lock().unwrap();
        let file = state.files.remove(from).ok_or_else(|| not_found(from))?;
        state.files.insert(to.to_owned(), file);
        Ok(self.root.join(to))
    }
}

/// Scripted portal: every element exists unless told otherwise, export
/// clicks drop a new CSV into the attached directory.
pub struct FakeDriver {
    pub actions: Vec<String>,
    pub quit_called: bool,
    locators: PortalLocators,
    directory: Option<Arc<FakeDirectory>>,
    current_report: Option<String>,
    no_data: HashSet<String>,
    missing: HashSet<Locator>,
    accept_login: bool,
    logged_in: bool,
    exports: u32,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            quit_called: false,
            locators: PortalLocators::default(),
            directory: None,
            current_report: None,
            no_data: HashSet::new(),
            missing: HashSet::new(),
            accept_login: true,
            logged_in: false,
            exports: 0,
        }
    }

    pub fn logged_in(mut self) -> Self {
        self.logged_in = true;
        self
    }

    pub fn rejecting_login(mut self) -> Self {
        self.accept_login = false;
        self
    }

    pub fn with_directory(mut self, directory: Arc<FakeDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn without_data(mut self, report_type: ReportType) -> Self {
        self.no_data.insert(report_type.label().to_owned());
        self
    }

    pub fn missing(mut self, locator: Locator) -> Self {
        self.missing.insert(locator);
        self
    }

    pub fn count(&self, action: &str) -> usize {
        self.actions.iter().filter(|a| a.as_str() == action).count()
    }

    fn is_present(&self, locator: &Locator) -> bool {
        if self.missing.contains(locator) {
            return false;
        }
        if *locator == self.locators.nav_toggle {
            return self.logged_in;
        }
        if *locator == self.locators.export_button {
            return self
                .current_report
                .as_ref()
                .is_some_and(|label| !self.no_data.contains(label));
        }
        true
    }
}

#[async_trait]
impl PortalDriver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.actions.push(format!("navigate {url}"));
        Ok(())
    }

    async fn click(&mut self, locator: &Locator) -> Result<(), DriverError> {
        if !self.is_present(locator) {
            return Err(DriverError::ElementNotFound(locator.clone()));
        }
        self.actions.push(format!("click {locator}"));

        if let Locator::LinkText(label) = locator
            && ReportType::ALL.iter().any(|r| r.label() == label)
        {
            self.current_report = Some(label.clone());
        }
        if *locator == self.locators.submit_button {
            self.logged_in = self.accept_login;
        }
        if *locator == self.locators.export_button
            && let Some(directory) = &self.directory
        {
            self.exports += 1;
            directory.add_file(&format!("export_{}.csv", self.exports), &[64]);
        }
        Ok(())
    }

    async fn type_text(&mut self, locator: &Locator, _text: &str) -> Result<(), DriverError> {
        self.actions.push(format!("type {locator}"));
        Ok(())
    }

    async fn select_option(
        &mut self,
        _locator: &Locator,
        visible_text: &str,
    ) -> Result<(), DriverError> {
        self.actions.push(format!("select {visible_text}"));
        Ok(())
    }

    async fn wait_for(
        &mut self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<bool, DriverError> {
        if self.quit_called {
            return Err(DriverError::SessionClosed);
        }
        Ok(self.is_present(locator))
    }

    async fn scroll_to_top(&mut self) -> Result<(), DriverError> {
        self.actions.push("scroll top".to_owned());
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        self.quit_called = true;
        Ok(())
    }
}

/// Fails the first `failures` session requests, then hands out drivers.
pub struct FakeFactory {
    failures: AtomicU32,
    pub calls: AtomicU32,
}

impl FakeFactory {
    pub const fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DriverFactory for FakeFactory {
    type Driver = FakeDriver;

    async fn create(&self, _settings: &BrowserSettings) -> Result<FakeDriver, DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DriverError::Protocol("chromedriver not ready".to_owned()));
        }
        Ok(FakeDriver::new())
    }
}
