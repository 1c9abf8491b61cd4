//! `robustus freeze`: one specifier per cached requirement, in pip's
//! requirements format.

use super::GlobalOptions;
use crate::cache::CacheIndex;
use crate::config::SettingsOverrides;
use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct FreezeCommand {}

impl FreezeCommand {
    pub async fn execute(self, global: &GlobalOptions) -> Result<()> {
        let settings = global.settings(SettingsOverrides::default()).await?;
        let index = CacheIndex::open(&settings.cache_dir)?;
        for entry in index.list().await? {
            println!("{}", entry.requirement.freeze());
        }
        Ok(())
    }
}
