//! Strategies that turn a requirement into installed files.
//!
//! A [`Builder`] knows how to build a requirement into the wheel cache, how to
//! install it from there, and how to install an editable checkout. The
//! [`BuilderRegistry`] picks the builder for each requirement: a plugin
//! registered under the requirement's name (compared case-insensitively) or,
//! failing that, the generic [`WheelBuilder`].

pub mod pip;
pub mod system_link;
pub mod wheel;

pub use system_link::SystemLinkBuilder;
pub use wheel::WheelBuilder;

use crate::config::Settings;
use crate::requirement::Requirement;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a successful build left in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Name of the builder that produced it.
    pub builder: String,
    /// Files the build wrote to the cache, or linked from the system.
    pub files: Vec<PathBuf>,
}

/// A build strategy.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Stable name stored in cache records.
    fn name(&self) -> &str;

    /// Builds `requirement` and stores the result under `cache_dir`.
    async fn build_and_cache(&self, requirement: &Requirement, cache_dir: &Path) -> Result<Artifact>;

    /// Installs a previously built `requirement` from `cache_dir`.
    async fn install_cached(&self, requirement: &Requirement, cache_dir: &Path) -> Result<()>;

    /// Installs an editable checkout, bypassing the cache.
    async fn install_editable(&self, requirement: &Requirement) -> Result<()>;
}

/// Name-specific builders plus the generic fallback.
#[derive(Clone)]
pub struct BuilderRegistry {
    plugins: HashMap<String, Arc<dyn Builder>>,
    generic: Arc<dyn Builder>,
}

impl BuilderRegistry {
    pub fn new(generic: Arc<dyn Builder>) -> Self {
        Self {
            plugins: HashMap::new(),
            generic,
        }
    }

    /// The registry for an environment: pip wheels for everything, system
    /// links for the packages listed in `[[system_packages]]`.
    pub fn for_settings(settings: &Settings) -> Self {
        let generic = Arc::new(WheelBuilder::from_settings(settings));
        let mut registry = Self::new(generic);
        for package in &settings.system_packages {
            registry.register(
                &package.name,
                Arc::new(SystemLinkBuilder::new(package.clone(), settings.clone())),
            );
        }
        registry
    }

    /// Registers `builder` for requirements named `name`, replacing any
    /// earlier plugin.
    pub fn register(&mut self, name: &str, builder: Arc<dyn Builder>) {
        self.plugins.insert(name.to_lowercase(), builder);
    }

    pub fn select(&self, requirement: &Requirement) -> Arc<dyn Builder> {
        requirement
            .display_name()
            .and_then(|name| self.plugins.get(&name.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| self.generic.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Builder for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn build_and_cache(&self, _: &Requirement, _: &Path) -> Result<Artifact> {
            Ok(Artifact {
                builder: self.0.to_string(),
                files: Vec::new(),
            })
        }

        async fn install_cached(&self, _: &Requirement, _: &Path) -> Result<()> {
            Ok(())
        }

        async fn install_editable(&self, _: &Requirement) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_select_plugin_case_insensitive() {
        let mut registry = BuilderRegistry::new(Arc::new(Named("wheel")));
        registry.register("PyGTK", Arc::new(Named("pygtk")));

        let pick = |text: &str| registry.select(&text.parse().unwrap()).name().to_string();
        assert_eq!(pick("pygtk"), "pygtk");
        assert_eq!(pick("PYGTK==2.24"), "pygtk");
        assert_eq!(pick("numpy==1.7.2"), "wheel");
        assert_eq!(pick("https://host/archive/pygtk-2.24.tar.gz"), "wheel");
    }

    #[test]
    fn test_select_plugin_by_egg_name() {
        let mut registry = BuilderRegistry::new(Arc::new(Named("wheel")));
        registry.register("pygtk", Arc::new(Named("pygtk")));
        let requirement: Requirement = "git+https://host/pygtk#egg=pygtk".parse().unwrap();
        assert_eq!(registry.select(&requirement).name(), "pygtk");
    }

    #[test]
    fn test_for_settings_registers_system_packages() {
        let mut settings = Settings::new("/venv");
        settings.system_packages.push(crate::config::SystemPackage {
            name: "pygtk".to_string(),
            source_dir: PathBuf::from("/usr/lib/python2.7/dist-packages"),
            files: vec!["pygtk.py".to_string()],
            pth: None,
        });
        let registry = BuilderRegistry::for_settings(&settings);
        assert_eq!(registry.select(&Requirement::named("pygtk", None)).name(), "system-link");
        assert_eq!(registry.select(&Requirement::named("numpy", None)).name(), "wheel");
    }
}
