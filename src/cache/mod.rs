//! On-disk index of built artifacts ("rob" records).
//!
//! The wheel cache directory holds the built wheels themselves plus one record
//! file per fingerprint describing what was built:
//!
//! ```text
//! <env>/wheelhouse/
//! ├── numpy-1.7.2-cp27-none-linux_x86_64.whl
//! ├── numpy__1_7_2.rob            # named requirement numpy==1.7.2
//! ├── scipy.rob                   # unversioned requirement scipy
//! ├── ros_overlay__https%3A%2F%2Fgithub_com%2Fros%2Fgeometry_git.rob
//! ├── url-3f1c9a0b7d2e4c51.rob    # unnamed source location, hashed
//! └── .locks/
//!     └── numpy__1_7_2.lock       # held while numpy==1.7.2 builds
//! ```
//!
//! # Record lifecycle
//!
//! A record is created empty when a build for a new fingerprint begins,
//! replaced atomically with its JSON content when the build succeeds, and
//! deleted when the build fails. An empty or unreadable record is reported as
//! [`RobustusError::CacheCorruption`] and callers treat it as a miss.

pub mod lock;

use crate::core::{FileOperation, FileResultExt, RobustusError};
use crate::requirement::{ROB_EXTENSION, Requirement};
use crate::utils::{atomic_write, ensure_dir};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix of record names derived from a hashed source location.
const SOURCE_FINGERPRINT_PREFIX: &str = "url-";

/// Hex digits of the location hash kept in a source fingerprint.
const SOURCE_HASH_LEN: usize = 16;

/// Identity of one cache slot: `<name>__<version>`, `<name>`, or
/// `url-<hash>` for unnamed source locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of `requirement`.
    ///
    /// ```
    /// use robustus::cache::Fingerprint;
    /// use robustus::requirement::parse;
    ///
    /// assert_eq!(Fingerprint::of(&parse("numpy==1.7.2").unwrap()).as_str(), "numpy__1_7_2");
    /// assert!(Fingerprint::of(&parse("http://h/pkg.tar.gz").unwrap()).as_str().starts_with("url-"));
    /// ```
    pub fn of(requirement: &Requirement) -> Self {
        if let Some(file_name) = requirement.rob_filename() {
            let stem = file_name
                .strip_suffix(&format!(".{ROB_EXTENSION}"))
                .unwrap_or(&file_name)
                .to_string();
            return Self(stem);
        }
        let location = requirement.source().map(|s| s.as_str()).unwrap_or_default();
        let digest = hex::encode(Sha256::digest(location.as_bytes()));
        Self(format!("{SOURCE_FINGERPRINT_PREFIX}{}", &digest[..SOURCE_HASH_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Record file name, `<fingerprint>.rob`.
    pub fn file_name(&self) -> String {
        format!("{}.{ROB_EXTENSION}", self.0)
    }

    fn is_source_hash(stem: &str) -> bool {
        stem.strip_prefix(SOURCE_FINGERPRINT_PREFIX).is_some_and(|hash| {
            hash.len() == SOURCE_HASH_LEN && hash.chars().all(|c| c.is_ascii_hexdigit())
        })
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content of a completed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// `freeze()` of the requirement that was built.
    pub specifier: String,
    /// Name of the builder that produced the artifacts.
    pub builder: String,
    /// Files the build left in the cache directory.
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn new(requirement: &Requirement, builder: &str, artifacts: Vec<PathBuf>) -> Self {
        Self {
            specifier: requirement.freeze_base(),
            builder: builder.to_string(),
            artifacts,
            created_at: Utc::now(),
        }
    }
}

/// A completed record found by [`CacheIndex::list`].
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub fingerprint: Fingerprint,
    pub requirement: Requirement,
    pub path: PathBuf,
}

/// The record files of one cache directory.
#[derive(Debug, Clone)]
pub struct CacheIndex {
    dir: PathBuf,
}

impl CacheIndex {
    /// Opens the index at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(Self {
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(fingerprint.file_name())
    }

    /// Reads the record for `fingerprint`.
    ///
    /// `Ok(None)` when no record exists.
    ///
    /// # Errors
    ///
    /// [`RobustusError::CacheCorruption`] when the record is empty (a build in
    /// progress or one that crashed) or not valid JSON.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheRecord>> {
        let path = self.record_path(fingerprint);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_file_context(FileOperation::Read, &path, "cache lookup")
                    .map_err(Into::into);
            }
        };
        Self::decode(&path, &content).map(Some).map_err(Into::into)
    }

    fn decode(path: &Path, content: &str) -> Result<CacheRecord, RobustusError> {
        if content.trim().is_empty() {
            return Err(RobustusError::CacheCorruption {
                path: path.display().to_string(),
                reason: "record is empty; its build never completed".to_string(),
            });
        }
        serde_json::from_str(content).map_err(|e| RobustusError::CacheCorruption {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Creates the empty placeholder record for a build that is starting.
    pub async fn begin(&self, fingerprint: &Fingerprint) -> Result<()> {
        let path = self.record_path(fingerprint);
        tokio::fs::write(&path, b"").await.with_file_context(
            FileOperation::Write,
            &path,
            "starting cache record",
        )?;
        Ok(())
    }

    /// Atomically stores the completed `record`.
    pub async fn write(&self, fingerprint: &Fingerprint, record: &CacheRecord) -> Result<()> {
        let path = self.record_path(fingerprint);
        let json = serde_json::to_vec_pretty(record).context("Failed to serialize cache record")?;
        tokio::task::spawn_blocking(move || atomic_write(&path, &json))
            .await
            .context("Failed to spawn blocking task for record write")?
    }

    /// Deletes the record for `fingerprint`; a missing record is not an error.
    pub async fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
        let path = self.record_path(fingerprint);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_file_context(FileOperation::Remove, &path, "deleting cache record")
                .map_err(Into::into),
        }
    }

    /// Lists completed records, sorted by file name.
    ///
    /// Named records are reconstructed from their file name alone; hashed
    /// source records are read for their specifier. Empty or unreadable
    /// records are skipped with a warning.
    pub async fn list(&self) -> Result<Vec<CachedEntry>> {
        let pattern = format!(
            "{}/*.{ROB_EXTENSION}",
            glob::Pattern::escape(&self.dir.display().to_string())
        );
        let mut paths: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("Invalid cache directory: {}", self.dir.display()))?
            .filter_map(std::result::Result::ok)
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            match self.read_entry(&path).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => tracing::debug!("Skipping incomplete record {}", path.display()),
                Err(e) => tracing::warn!("Skipping unreadable record {}: {e:#}", path.display()),
            }
        }
        Ok(entries)
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<CachedEntry>> {
        let metadata = tokio::fs::metadata(path).await.with_file_context(
            FileOperation::Read,
            path,
            "listing cache records",
        )?;
        if metadata.len() == 0 {
            return Ok(None);
        }

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        let requirement = if Fingerprint::is_source_hash(&stem) {
            let content = tokio::fs::read_to_string(path).await.with_file_context(
                FileOperation::Read,
                path,
                "listing cache records",
            )?;
            let record = Self::decode(path, &content)?;
            crate::requirement::parse(&record.specifier)?
        } else {
            Requirement::from_rob_filename(path)?
        };

        Ok(Some(CachedEntry {
            fingerprint: Fingerprint(stem),
            requirement,
            path: path.to_path_buf(),
        }))
    }
}
