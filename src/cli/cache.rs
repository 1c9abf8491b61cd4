//! `robustus cache`: inspect and prune the wheel cache.

use super::GlobalOptions;
use crate::cache::lock::CacheLock;
use crate::cache::{CacheIndex, Fingerprint};
use crate::config::SettingsOverrides;
use crate::requirement::Requirement;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

#[derive(Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: Option<CacheSubcommands>,
}

#[derive(Subcommand)]
enum CacheSubcommands {
    /// Show every record with its builder and creation time (default).
    List,
    /// Delete the record of one requirement so it is rebuilt on next install.
    Remove {
        /// Specifier as passed to install, e.g. numpy==1.7.2.
        specifier: String,
    },
    /// Delete records whose build never completed.
    Clean,
}

impl CacheCommand {
    pub async fn execute(self, global: &GlobalOptions) -> Result<()> {
        let settings = global.settings(SettingsOverrides::default()).await?;
        let index = CacheIndex::open(&settings.cache_dir)?;

        match self.command.unwrap_or(CacheSubcommands::List) {
            CacheSubcommands::List => list(&index).await,
            CacheSubcommands::Remove {
                specifier,
            } => remove(&index, &specifier).await,
            CacheSubcommands::Clean => clean(&index).await,
        }
    }
}

async fn list(index: &CacheIndex) -> Result<()> {
    println!("{} {}", "Cache:".bold(), index.dir().display());
    let entries = index.list().await?;
    if entries.is_empty() {
        println!("  (empty)");
    }
    for entry in entries {
        match index.lookup(&entry.fingerprint).await {
            Ok(Some(record)) => println!(
                "  {} {} {}",
                entry.requirement.freeze().green(),
                format!("[{}]", record.builder).dimmed(),
                record.created_at.format("%Y-%m-%d %H:%M")
            ),
            _ => println!("  {} {}", entry.requirement.freeze().yellow(), "[unreadable record]".dimmed()),
        }
    }
    Ok(())
}

async fn remove(index: &CacheIndex, specifier: &str) -> Result<()> {
    let requirement: Requirement =
        specifier.parse().with_context(|| format!("Cannot remove {specifier} from the cache"))?;
    let fingerprint = Fingerprint::of(&requirement);
    let path = index.record_path(&fingerprint);
    if !path.exists() {
        anyhow::bail!("{specifier} is not cached ({} does not exist)", path.display());
    }
    index.delete(&fingerprint).await?;
    println!("{} Removed {}", "✓".green(), path.display());
    Ok(())
}

/// Removes empty records left by interrupted builds. Records being written
/// right now are locked and skipped.
async fn clean(index: &CacheIndex) -> Result<()> {
    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&index.dir().display().to_string()),
        crate::requirement::ROB_EXTENSION
    );
    let mut removed = 0;
    for path in glob::glob(&pattern)?.filter_map(std::result::Result::ok) {
        let empty = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(false);
        if !empty {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(_lock) = CacheLock::try_acquire(index.dir(), name).await? else {
            tracing::debug!("Skipping {}: build in progress", path.display());
            continue;
        };
        tokio::fs::remove_file(&path).await.with_context(|| format!("Failed to remove {}", path.display()))?;
        removed += 1;
    }
    println!("{} Removed {removed} incomplete record(s)", "✓".green());
    Ok(())
}
