//! `robustus resolve`: print the install list.
//!
//! Also home of [`collect_requirements`], the expansion and deduplication
//! shared with `install`.

use super::GlobalOptions;
use crate::config::{Settings, SettingsOverrides, get_cache_dir};
use crate::core::RobustusError;
use crate::git::GitFetcher;
use crate::requirement::Requirement;
use crate::resolver::{ResolutionContext, dedup};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

/// Specifier sources accepted by `install` and `resolve`.
#[derive(Args, Debug, Default)]
pub struct RequirementArgs {
    /// Requirements file; can be given multiple times.
    #[arg(short = 'r', long = "requirement", value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Packages in the format <name>[==version|>=version] or a URL.
    pub packages: Vec<String>,

    /// Installs a package in editable mode.
    #[arg(short, long, value_name = "URL")]
    pub editable: Vec<String>,
}

impl RequirementArgs {
    fn specifiers(&self) -> Vec<String> {
        self.packages.iter().cloned().chain(self.editable.iter().map(|e| format!("-e {e}"))).collect()
    }
}

/// Expands command-line specifiers, then requirement files, and collapses
/// duplicates.
///
/// # Errors
///
/// [`RobustusError::NoRequirements`] when nothing was given, and any parse or
/// expansion error.
pub async fn collect_requirements(settings: &Settings, args: &RequirementArgs) -> Result<Vec<Requirement>> {
    let repos_dir = get_cache_dir()?.join("repos");
    let mut context = ResolutionContext::new(Arc::new(GitFetcher::new(repos_dir)));

    let mut requirements = context.expand_all(&args.specifiers()).await?;
    for file in &args.files {
        let expanded = context
            .expand_file(file)
            .await
            .with_context(|| format!("Failed to expand requirements from {}", file.display()))?;
        requirements.extend(expanded);
    }

    if requirements.is_empty() {
        return Err(RobustusError::NoRequirements.into());
    }
    Ok(dedup(requirements, &settings.overlay_packages))
}

#[derive(Args)]
pub struct ResolveCommand {
    #[command(flatten)]
    requirements: RequirementArgs,
}

impl ResolveCommand {
    pub async fn execute(self, global: &GlobalOptions) -> Result<()> {
        let settings = global.settings(SettingsOverrides::default()).await?;
        for requirement in collect_requirements(&settings, &self.requirements).await? {
            println!("{}", requirement.freeze());
        }
        Ok(())
    }
}
