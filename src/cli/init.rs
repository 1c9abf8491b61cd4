//! `robustus init`: turn an existing virtualenv into a robustus environment.
//!
//! Creating the virtualenv itself is left to `virtualenv`/`python -m venv`;
//! this only checks that pip is there and writes the `.robustus` file.

use super::GlobalOptions;
use crate::config::{Settings, SettingsFile};
use crate::constants::SETTINGS_FILE;
use anyhow::{Result, anyhow};
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct InitCommand {
    /// Overwrite an existing .robustus file.
    #[arg(short, long)]
    force: bool,
}

impl InitCommand {
    pub async fn execute(self, global: &GlobalOptions) -> Result<()> {
        let settings_path = global.env_dir.join(SETTINGS_FILE);
        if settings_path.exists() && !self.force {
            return Err(anyhow!(
                "Settings already exist at {}. Use --force to overwrite",
                settings_path.display()
            ));
        }

        Settings::new(&global.env_dir).pip_executable()?;

        let mut file = SettingsFile::initial();
        if let Some(cache) = &global.cache {
            file.cache = Some(cache.display().to_string());
        }
        file.save_to(&settings_path).await?;

        println!("{} Initialized robustus environment at {}", "✓".green(), global.env_dir.display());
        println!("\n  Then run {} to install", "robustus install -r requirements.txt".bright_white());
        Ok(())
    }
}
