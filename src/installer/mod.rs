//! Installing requirements through the wheel cache.
//!
//! [`Installer`] guarantees that each distinct fingerprint (name and version,
//! or hashed source location) is built at most once, ever: once a complete
//! record exists in the cache every later install of a matching requirement
//! goes straight to [`Builder::install_cached`].
//!
//! # Flow for one requirement
//!
//! 1. Editable requirements are live checkouts and bypass the cache.
//! 2. A known cached requirement that [allows](Requirement::allows) the
//!    request is installed from the cache.
//! 3. Otherwise the fingerprint lock is taken and the record is checked again,
//!    since another process may have completed it while we waited.
//! 4. An empty record marks the build as started; the selected builder builds
//!    and installs; the record is filled in.
//! 5. On any failure the record is deleted so the next run rebuilds, and the
//!    error is reported as [`RobustusError::InstallError`].

use crate::builder::{Artifact, Builder, BuilderRegistry};
use crate::cache::lock::CacheLock;
use crate::cache::{CacheIndex, CacheRecord, Fingerprint};
use crate::config::Settings;
use crate::constants::DEFAULT_LOCK_TIMEOUT;
use crate::core::RobustusError;
use crate::requirement::Requirement;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What to do after a requirement fails to install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure.
    #[default]
    Abort,
    /// Install the rest and report every failure at the end.
    KeepGoing,
}

/// How a requirement ended up installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Installed from an existing cache record.
    Cached,
    /// Built into the cache, then installed.
    Built,
    /// Installed as a live checkout.
    Editable,
    /// Editable checkout already present and left alone.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Installation {
    pub requirement: Requirement,
    pub outcome: Outcome,
    /// Present when this run built the requirement.
    pub artifact: Option<Artifact>,
}

/// Result of [`Installer::install_all`].
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<Installation>,
    pub failures: Vec<RobustusError>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.installed.iter().filter(|i| i.outcome == outcome).count()
    }
}

/// The build-cache orchestrator for one environment.
pub struct Installer {
    settings: Settings,
    index: CacheIndex,
    registry: BuilderRegistry,
    /// Requirements with a complete record, seeded from the cache listing.
    known_cached: Vec<Requirement>,
    lock_timeout: Duration,
}

impl Installer {
    /// Opens the cache of `settings` and loads its record listing.
    pub async fn new(settings: Settings, registry: BuilderRegistry) -> Result<Self> {
        let index = CacheIndex::open(&settings.cache_dir)?;
        let known_cached: Vec<Requirement> =
            index.list().await?.into_iter().map(|entry| entry.requirement).collect();
        debug!("{} cached requirement(s) in {}", known_cached.len(), index.dir().display());
        Ok(Self {
            settings,
            index,
            registry,
            known_cached,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn known_cached(&self) -> &[Requirement] {
        &self.known_cached
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    fn find_satisfactory(&self, requirement: &Requirement) -> Option<&Requirement> {
        self.known_cached.iter().find(|cached| requirement.allows(cached))
    }

    fn remember(&mut self, requirement: &Requirement) {
        if self.find_satisfactory(requirement).is_none() {
            self.known_cached.push(requirement.clone());
        }
    }

    /// Installs `requirement`, building it into the cache first when no
    /// complete record satisfies it.
    ///
    /// # Errors
    ///
    /// [`RobustusError::InstallError`] carrying the specifier and the
    /// underlying failure: a [`RobustusError::BuildError`] when the builder
    /// failed, [`RobustusError::Other`] for cache and lock failures.
    pub async fn ensure_installed(&mut self, requirement: &Requirement) -> Result<Installation, RobustusError> {
        info!("Installing {}", requirement.freeze());
        let outcome = self.install(requirement).await.map_err(|error| {
            let typed = match error.downcast::<RobustusError>() {
                Ok(typed) => typed,
                Err(error) => RobustusError::Other {
                    message: format!("{error:#}"),
                },
            };
            typed.into_install_error(requirement.freeze())
        })?;
        info!("Done");
        Ok(outcome)
    }

    async fn install(&mut self, requirement: &Requirement) -> Result<Installation> {
        let builder = self.registry.select(requirement);
        let installation = |outcome: Outcome, artifact: Option<Artifact>| Installation {
            requirement: requirement.clone(),
            outcome,
            artifact,
        };

        if requirement.is_editable() {
            if self.editable_checkout_exists(requirement) {
                return Ok(installation(Outcome::Skipped, None));
            }
            builder.install_editable(requirement).await?;
            return Ok(installation(Outcome::Editable, None));
        }

        let cache_dir = self.index.dir().to_path_buf();
        if let Some(cached) = self.find_satisfactory(requirement) {
            debug!("{} satisfied by cached {}", requirement.freeze(), cached.freeze());
            builder.install_cached(requirement, &cache_dir).await?;
            return Ok(installation(Outcome::Cached, None));
        }

        let fingerprint = Fingerprint::of(requirement);
        let _lock = CacheLock::acquire(&cache_dir, fingerprint.as_str(), self.lock_timeout)
            .await
            .with_context(|| format!("Failed to lock cache slot {fingerprint}"))?;

        match self.index.lookup(&fingerprint).await {
            Ok(Some(record)) => {
                debug!("{} was built by {} while we waited", record.specifier, record.builder);
                builder.install_cached(requirement, &cache_dir).await?;
                self.remember(requirement);
                return Ok(installation(Outcome::Cached, None));
            }
            Ok(None) => {}
            Err(error) => match error.downcast_ref::<RobustusError>() {
                Some(RobustusError::CacheCorruption {
                    reason,
                    ..
                }) => warn!("Rebuilding {}: {reason}", requirement.freeze()),
                _ => return Err(error),
            },
        }

        self.index.begin(&fingerprint).await?;
        match build_and_install(builder.as_ref(), requirement, &self.index).await {
            Ok(artifact) => {
                let record = CacheRecord::new(requirement, &artifact.builder, artifact.files.clone());
                self.index.write(&fingerprint, &record).await?;
                self.remember(requirement);
                Ok(installation(Outcome::Built, Some(artifact)))
            }
            Err(error) => {
                let record = self.index.record_path(&fingerprint);
                warn!(
                    "Robustus will delete the corresponding {} file in order to recreate the wheel in the future. Please run again.",
                    record.display()
                );
                if let Err(delete_error) = self.index.delete(&fingerprint).await {
                    warn!("Failed to delete {}: {delete_error:#}", record.display());
                }
                Err(error)
            }
        }
    }

    /// An editable remote checkout already in `<env>/src/<name>` is left
    /// alone unless editables are being updated.
    fn editable_checkout_exists(&self, requirement: &Requirement) -> bool {
        if self.settings.update_editables || !requirement.source().is_some_and(|s| !s.is_local()) {
            return false;
        }
        let Some(name) = requirement.display_name() else {
            return false;
        };
        let checkout = self.settings.editable_src_dir().join(name);
        if checkout.exists() {
            warn!(
                "For safety reasons robustus will not proceed with requirement {}, because directories for \
                 installing this package already exists ({}). To update editable dependency, please remove \
                 folder and run again.",
                requirement.freeze(),
                checkout.display()
            );
            return true;
        }
        false
    }

    /// Installs `requirements` in order.
    pub async fn install_all(&mut self, requirements: &[Requirement], policy: FailurePolicy) -> InstallReport {
        let mut report = InstallReport::default();
        for requirement in requirements {
            match self.ensure_installed(requirement).await {
                Ok(installation) => report.installed.push(installation),
                Err(error) => {
                    tracing::error!("{error}");
                    report.failures.push(error);
                    if policy == FailurePolicy::Abort {
                        break;
                    }
                }
            }
        }
        report
    }

    /// The registry used to pick builders.
    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }
}

async fn build_and_install(
    builder: &dyn Builder,
    requirement: &Requirement,
    index: &CacheIndex,
) -> Result<Artifact> {
    let artifact = builder.build_and_cache(requirement, index.dir()).await.map_err(|error| {
        if error.is::<RobustusError>() {
            return error;
        }
        RobustusError::BuildError {
            specifier: requirement.freeze(),
            reason: format!("{error:#}"),
        }
        .into()
    })?;
    builder.install_cached(requirement, index.dir()).await?;
    Ok(artifact)
}
