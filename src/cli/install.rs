//! `robustus install`

use super::GlobalOptions;
use super::resolve::{RequirementArgs, collect_requirements};
use crate::builder::BuilderRegistry;
use crate::config::SettingsOverrides;
use crate::installer::{FailurePolicy, Installer, Outcome};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct InstallCommand {
    #[command(flatten)]
    requirements: RequirementArgs,

    /// Ignore the package index, only looking in the cache and at --find-links.
    #[arg(long)]
    no_index: bool,

    /// Location where to find packages; also passed to pip.
    #[arg(short = 'f', long = "find-links", value_name = "URL")]
    find_links: Vec<String>,

    /// Reinstall editable requirements whose checkout already exists in <env>/src.
    #[arg(long)]
    update_editables: bool,

    /// Keep installing after a failure and report all failures at the end.
    #[arg(long)]
    keep_going: bool,
}

impl InstallCommand {
    pub async fn execute(self, global: &GlobalOptions) -> Result<()> {
        let settings = global
            .settings(SettingsOverrides {
                find_links: self.find_links,
                no_index: self.no_index,
                update_editables: self.update_editables,
                ..SettingsOverrides::default()
            })
            .await?;

        let requirements = collect_requirements(&settings, &self.requirements).await?;
        let registry = BuilderRegistry::for_settings(&settings);
        let mut installer = Installer::new(settings, registry).await?;

        tracing::info!(
            "Here are all packages cached in robustus:\n{}",
            installer.known_cached().iter().map(|r| r.freeze()).collect::<Vec<_>>().join("\n")
        );
        tracing::info!(
            "Here are all the requirements robustus is going to install:\n{}",
            requirements.iter().map(|r| r.freeze()).collect::<Vec<_>>().join("\n")
        );

        let policy = if self.keep_going { FailurePolicy::KeepGoing } else { FailurePolicy::Abort };
        let mut report = installer.install_all(&requirements, policy).await;

        println!(
            "{} {} built, {} from cache, {} editable, {} skipped",
            if report.is_success() { "✓".green() } else { "✗".red() },
            report.count(Outcome::Built),
            report.count(Outcome::Cached),
            report.count(Outcome::Editable),
            report.count(Outcome::Skipped)
        );

        match report.failures.len() {
            0 => Ok(()),
            1 => Err(report.failures.remove(0).into()),
            n => {
                let failed: Vec<String> =
                    report.failures.iter().filter_map(|f| f.specifier().map(str::to_string)).collect();
                anyhow::bail!("{n} requirements failed to install: {}", failed.join(", "))
            }
        }
    }
}
