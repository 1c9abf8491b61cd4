//! Builder plugin that links a system-wide installation into the environment.
//!
//! Some packages (PyGTK being the classic case) cannot be built with pip and
//! are instead taken from the host's `dist-packages`. Each configured file is
//! symlinked into the environment's site-packages, and an optional `.pth`
//! entry adds a subdirectory to `sys.path`.

use super::{Artifact, Builder};
use crate::config::{Settings, SystemPackage};
use crate::core::file_error::{FileOperation, FileResultExt};
use crate::requirement::Requirement;
use crate::utils::replace_with_symlink;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub const SYSTEM_LINK_BUILDER: &str = "system-link";

pub struct SystemLinkBuilder {
    package: SystemPackage,
    settings: Settings,
}

impl SystemLinkBuilder {
    pub fn new(package: SystemPackage, settings: Settings) -> Self {
        Self {
            package,
            settings,
        }
    }

    /// System files to link, checked for existence.
    fn sources(&self) -> Result<Vec<PathBuf>> {
        let name = &self.package.name;
        if !self.package.source_dir.is_dir() {
            anyhow::bail!("System-wide {name} is missing: {} not found", self.package.source_dir.display());
        }
        self.package
            .files
            .iter()
            .map(|file| {
                let source = self.package.source_dir.join(file);
                if source.exists() {
                    Ok(source)
                } else {
                    Err(anyhow::anyhow!("Required packages for system-wide {name} missing, {file} not found"))
                }
            })
            .collect()
    }

    async fn link(&self) -> Result<()> {
        let sources = self.sources()?;
        let site_packages = self.settings.site_packages_dir()?;
        tracing::info!("Linking {}", self.package.name);

        for source in &sources {
            if let Some(file_name) = source.file_name() {
                replace_with_symlink(source, &site_packages.join(file_name))?;
            }
        }

        if let Some(subdir) = &self.package.pth {
            let pth = site_packages.join(format!("{}.pth", self.package.name.to_lowercase()));
            if !pth.exists() {
                let entry = site_packages.join(subdir);
                tokio::fs::write(&pth, format!("{}\n", entry.display())).await.with_file_context(
                    FileOperation::Write,
                    &pth,
                    "path configuration",
                )?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Builder for SystemLinkBuilder {
    fn name(&self) -> &str {
        SYSTEM_LINK_BUILDER
    }

    /// Nothing is built; the system files are validated and recorded.
    async fn build_and_cache(&self, _requirement: &Requirement, _cache_dir: &Path) -> Result<Artifact> {
        Ok(Artifact {
            builder: SYSTEM_LINK_BUILDER.to_string(),
            files: self.sources()?,
        })
    }

    async fn install_cached(&self, _requirement: &Requirement, _cache_dir: &Path) -> Result<()> {
        self.link().await
    }

    async fn install_editable(&self, requirement: &Requirement) -> Result<()> {
        anyhow::bail!("{} is linked from the system and cannot be installed as editable", requirement.freeze())
    }
}
