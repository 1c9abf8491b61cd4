//! The generic builder: pip wheels kept in the cache directory.
//!
//! A miss downloads the source distribution into the cache, builds a wheel
//! from it with the cache as the only index and installs that wheel. A hit
//! only runs the last step, so nothing is compiled twice.

use super::pip::PipCommand;
use super::{Artifact, Builder};
use crate::config::Settings;
use crate::requirement::Requirement;
use crate::utils::ensure_dir;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const WHEEL_BUILDER: &str = "wheel";

pub struct WheelBuilder {
    pip: PathBuf,
    find_links: Vec<String>,
    no_index: bool,
    verbosity: u8,
}

impl WheelBuilder {
    pub fn new(pip: impl Into<PathBuf>) -> Self {
        Self {
            pip: pip.into(),
            find_links: Vec::new(),
            no_index: false,
            verbosity: 0,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            pip: settings.env_executable("pip"),
            find_links: settings.find_links.clone(),
            no_index: settings.no_index,
            verbosity: settings.verbosity,
        }
    }

    fn pip(&self) -> PipCommand {
        PipCommand::new(&self.pip)
    }

    fn download_command(&self, specifier: &str, cache_dir: &Path) -> PipCommand {
        let mut cmd = self.pip().args(["download", "--dest"]).arg(cache_dir.display().to_string());
        if self.no_index {
            cmd = cmd.arg("--no-index").arg(format!("--find-links={}", cache_dir.display()));
        }
        for link in &self.find_links {
            cmd = cmd.arg(format!("--find-links={link}"));
        }
        cmd.arg(specifier).echo(self.verbosity >= 2)
    }

    fn wheel_command(&self, specifier: &str, cache_dir: &Path) -> PipCommand {
        let mut cmd = self
            .pip()
            .args(["wheel", "--no-index"])
            .arg(format!("--find-links={}", cache_dir.display()))
            .arg(format!("--wheel-dir={}", cache_dir.display()))
            .arg(specifier);
        for _ in 0..self.verbosity {
            cmd = cmd.arg("-v");
        }
        cmd.echo(self.verbosity >= 1)
    }

    fn install_command(&self, specifier: &str, cache_dir: &Path) -> PipCommand {
        self.pip()
            .args(["install", "--no-index"])
            .arg(format!("--find-links={}", cache_dir.display()))
            .arg(specifier)
            .echo(self.verbosity >= 2)
    }

    async fn build(&self, requirement: &Requirement, cache_dir: &Path) -> Result<Artifact> {
        let specifier = requirement.freeze_base();
        ensure_dir(cache_dir)?;
        let before = wheels_in(cache_dir)?;

        tracing::info!("Wheel not found, downloading package");
        self.download_command(&specifier, cache_dir)
            .execute_success()
            .await
            .with_context(|| format!("pip failed to download requirement {specifier}"))?;

        tracing::info!("Building wheel");
        self.wheel_command(&specifier, cache_dir)
            .execute_success()
            .await
            .with_context(|| format!("pip failed to build wheel for requirement {specifier}"))?;

        let files: Vec<PathBuf> = wheels_in(cache_dir)?.difference(&before).cloned().collect();
        tracing::debug!("{specifier} produced {} new wheel(s)", files.len());
        Ok(Artifact {
            builder: WHEEL_BUILDER.to_string(),
            files,
        })
    }

    async fn install(&self, requirement: &Requirement, cache_dir: &Path) -> Result<()> {
        let specifier = requirement.freeze_base();
        tracing::info!("Installing package from wheel");
        self.install_command(&specifier, cache_dir).execute_success().await.with_context(|| {
            format!("pip failed to install requirement {specifier} from wheels cache {}", cache_dir.display())
        })
    }

    async fn install_live(&self, requirement: &Requirement) -> Result<()> {
        let location = requirement.freeze_base();
        self.pip()
            .args(["install", "-e"])
            .arg(&location)
            .echo(self.verbosity >= 1)
            .execute_success()
            .await
            .with_context(|| format!("pip failed to install editable requirement {location}"))
    }
}

#[async_trait]
impl Builder for WheelBuilder {
    fn name(&self) -> &str {
        WHEEL_BUILDER
    }

    async fn build_and_cache(&self, requirement: &Requirement, cache_dir: &Path) -> Result<Artifact> {
        self.build(requirement, cache_dir).await
    }

    async fn install_cached(&self, requirement: &Requirement, cache_dir: &Path) -> Result<()> {
        self.install(requirement, cache_dir).await
    }

    async fn install_editable(&self, requirement: &Requirement) -> Result<()> {
        self.install_live(requirement).await
    }
}

/// Wheel files currently in `dir`.
fn wheels_in(dir: &Path) -> Result<BTreeSet<PathBuf>> {
    let pattern = format!("{}/*.whl", glob::Pattern::escape(&dir.display().to_string()));
    Ok(glob::glob(&pattern)
        .with_context(|| format!("Invalid cache path {}", dir.display()))?
        .filter_map(std::result::Result::ok)
        .collect())
}
