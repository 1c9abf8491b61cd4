//! Test utilities for robustus
//!
//! Fakes for the two collaborators the core talks to, plus a throwaway
//! environment fixture:
//! - [`FakeFetcher`] serves requirement files from memory and records calls
//! - [`RecordingBuilder`] pretends to build wheels and records calls
//! - [`TestEnv`] is a temporary directory laid out like a robustus environment
//!
//! # Example
//!
//! ```rust,no_run
//! use robustus::test_utils::{FakeFetcher, RecordingBuilder, TestEnv};
//!
//! let fetcher = FakeFetcher::new()
//!     .with_file("https://github.com/company/my_package", Some("master"), &["numpy==1.7.2"]);
//! let builder = RecordingBuilder::new().failing_on("scipy==0.13.0");
//! let env = TestEnv::new().unwrap();
//! ```

use crate::builder::{Artifact, Builder};
use crate::config::{Settings, SettingsFile};
use crate::constants::SETTINGS_FILE;
use crate::requirement::Requirement;
use crate::resolver::{ContentFetcher, REQUIREMENTS_FILE};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, tests stay
/// silent.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// One recorded [`ContentFetcher::fetch`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub link: String,
    pub reference: Option<String>,
    pub path: String,
}

/// In-memory [`ContentFetcher`].
///
/// Files are keyed by `(link, reference)` and always served as
/// `requirements.txt`; anything unknown is reported as missing.
#[derive(Default)]
pub struct FakeFetcher {
    files: HashMap<(String, Option<String>), Vec<String>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<FetchCall>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `lines` as the requirements file of `link` at `reference`.
    #[must_use]
    pub fn with_file(mut self, link: &str, reference: Option<&str>, lines: &[&str]) -> Self {
        self.files.insert(
            (link.to_string(), reference.map(str::to_string)),
            lines.iter().map(|l| (*l).to_string()).collect(),
        );
        self
    }

    /// Makes every fetch from `link` fail like a broken network.
    #[must_use]
    pub fn failing_on(mut self, link: &str) -> Self {
        self.failing.insert(link.to_string());
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of fetches of `link`, at any reference.
    pub fn call_count(&self, link: &str) -> usize {
        self.calls().iter().filter(|c| c.link == link).count()
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(&self, link: &str, reference: Option<&str>, path: &str) -> Result<Option<Vec<String>>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(FetchCall {
                link: link.to_string(),
                reference: reference.map(str::to_string),
                path: path.to_string(),
            });
        }
        if self.failing.contains(link) {
            anyhow::bail!("connection to {link} refused");
        }
        if path != REQUIREMENTS_FILE {
            return Ok(None);
        }
        Ok(self.files.get(&(link.to_string(), reference.map(str::to_string))).cloned())
    }
}

/// [`Builder`] that writes a placeholder wheel and records every call by
/// specifier.
pub struct RecordingBuilder {
    name: String,
    failing: HashSet<String>,
    builds: Mutex<Vec<String>>,
    cached_installs: Mutex<Vec<String>>,
    editable_installs: Mutex<Vec<String>>,
}

impl Default for RecordingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::named("recording")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failing: HashSet::new(),
            builds: Mutex::new(Vec::new()),
            cached_installs: Mutex::new(Vec::new()),
            editable_installs: Mutex::new(Vec::new()),
        }
    }

    /// Makes builds of `specifier` (as rendered by `freeze`) fail.
    #[must_use]
    pub fn failing_on(mut self, specifier: &str) -> Self {
        self.failing.insert(specifier.to_string());
        self
    }

    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn cached_installs(&self) -> Vec<String> {
        self.cached_installs.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn editable_installs(&self) -> Vec<String> {
        self.editable_installs.lock().map(|b| b.clone()).unwrap_or_default()
    }

    fn record(log: &Mutex<Vec<String>>, requirement: &Requirement) {
        if let Ok(mut log) = log.lock() {
            log.push(requirement.freeze());
        }
    }

    /// Wheel file name, with characters outside `[A-Za-z0-9.]` in the version
    /// replaced by `_` as wheel names do.
    fn wheel_name(requirement: &Requirement) -> String {
        let version: String = requirement
            .version()
            .unwrap_or("0")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        format!("{}-{version}-py2-none-any.whl", requirement.display_name().unwrap_or("source"))
    }
}

#[async_trait]
impl Builder for RecordingBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn build_and_cache(&self, requirement: &Requirement, cache_dir: &Path) -> Result<Artifact> {
        Self::record(&self.builds, requirement);
        if self.failing.contains(&requirement.freeze()) {
            anyhow::bail!("pip wheel exited with code 1: could not build {}", requirement.freeze());
        }
        let wheel = cache_dir.join(Self::wheel_name(requirement));
        tokio::fs::write(&wheel, b"").await?;
        Ok(Artifact {
            builder: self.name.clone(),
            files: vec![wheel],
        })
    }

    async fn install_cached(&self, requirement: &Requirement, _cache_dir: &Path) -> Result<()> {
        Self::record(&self.cached_installs, requirement);
        Ok(())
    }

    async fn install_editable(&self, requirement: &Requirement) -> Result<()> {
        Self::record(&self.editable_installs, requirement);
        Ok(())
    }
}

/// A temporary robustus environment: a `.robustus` file, a site-packages
/// directory and an empty `wheelhouse`.
pub struct TestEnv {
    temp: TempDir,
}

impl TestEnv {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let env = Self {
            temp,
        };
        std::fs::create_dir_all(env.path().join("lib/python2.7/site-packages"))?;
        std::fs::create_dir_all(env.path().join("bin"))?;
        let file = toml::to_string_pretty(&SettingsFile::initial())?;
        std::fs::write(env.path().join(SETTINGS_FILE), file)?;
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.path())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.settings().cache_dir
    }
}
