//! Command-line interface for robustus.
//!
//! # Commands
//!
//! - `init` - Mark an existing virtualenv as a robustus environment
//! - `install` - Expand, deduplicate and install requirements through the cache
//! - `resolve` - Print the final install list without installing anything
//! - `freeze` - List the requirements present in the wheel cache
//! - `cache` - Inspect and prune the wheel cache
//!
//! # Global Options
//!
//! - `--env <dir>` - environment to operate on; defaults to the active
//!   virtualenv (`VIRTUAL_ENV`), then `.env`
//! - `--cache <dir>` - wheel cache, overriding the `.robustus` setting
//! - `-v` - more output, repeatable; `-vv` shows pip build logs
//! - `-q` - errors only
//! - `--debug` - debug logging
//!
//! ```bash
//! robustus install -r requirements.txt
//! robustus --env /opt/venv install numpy==1.7.2 -e git+https://github.com/company/my_package#egg=my_package
//! robustus freeze
//! ```

mod cache;
mod freeze;
mod init;
mod install;
mod resolve;

use crate::config::{Settings, SettingsOverrides};
use crate::constants::DEFAULT_ENV_DIR;
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI application structure for robustus.
#[derive(Parser)]
#[command(
    name = "robustus",
    about = "Install Python packages into a virtualenv from a cache of prebuilt wheels",
    version,
    long_about = "robustus installs requirements into a virtualenv, building each (name, version) into a \
                  wheel cache at most once and expanding editable repositories through their \
                  requirements.txt."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Environment to use (defaults to the active virtualenv, then .env).
    #[arg(long, global = true, env = "VIRTUAL_ENV")]
    env: Option<PathBuf>,

    /// Binary package cache directory, relative to the environment.
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Give more output; can be used up to 3 times.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log debug information, including every git and pip command.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a .robustus settings file into an existing virtualenv.
    Init(init::InitCommand),

    /// Install packages, building missing wheels into the cache.
    Install(install::InstallCommand),

    /// Print the expanded and deduplicated install list.
    Resolve(resolve::ResolveCommand),

    /// List cached binary packages.
    Freeze(freeze::FreezeCommand),

    /// Inspect and prune the wheel cache.
    Cache(cache::CacheCommand),
}

/// Options shared by every subcommand, resolved once.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub env_dir: PathBuf,
    pub cache: Option<PathBuf>,
    pub verbosity: u8,
}

impl GlobalOptions {
    /// Loads the environment settings with `overrides` plus the global
    /// `--cache` and `-v` values.
    pub async fn settings(&self, mut overrides: SettingsOverrides) -> Result<Settings> {
        overrides.cache = overrides.cache.or_else(|| self.cache.clone());
        overrides.verbosity = self.verbosity;
        Settings::load(&self.env_dir, overrides).await
    }
}

impl Cli {
    /// Log filter directive for the selected verbosity.
    ///
    /// `RUST_LOG`, when set, takes precedence in `main`.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.debug || self.verbose >= 3 {
            "debug"
        } else {
            "info"
        }
    }

    /// Resolves the global options against the process environment.
    pub fn global_options(&self) -> Result<GlobalOptions> {
        let env_dir = self.env.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_DIR));
        let env_dir = if env_dir.is_absolute() {
            env_dir
        } else {
            std::env::current_dir().context("Failed to read the current directory")?.join(env_dir)
        };
        Ok(GlobalOptions {
            env_dir,
            cache: self.cache.clone(),
            verbosity: self.verbose,
        })
    }

    pub async fn execute(self) -> Result<()> {
        let global = self.global_options()?;
        match self.command {
            Commands::Init(cmd) => cmd.execute(&global).await,
            Commands::Install(cmd) => cmd.execute(&global).await,
            Commands::Resolve(cmd) => cmd.execute(&global).await,
            Commands::Freeze(cmd) => cmd.execute(&global).await,
            Commands::Cache(cmd) => cmd.execute(&global).await,
        }
    }
}
