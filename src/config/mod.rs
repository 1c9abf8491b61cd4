//! Settings for one robustus environment.
//!
//! An environment is a virtualenv with a `.robustus` file at its root:
//!
//! ```toml
//! # wheel cache, relative to the environment unless absolute
//! cache = "wheelhouse"
//! # locations searched by `pip download`
//! find_links = ["http://thirdparty-packages.braincorporation.net"]
//! # packages whose version slot holds a location; kept distinct per version
//! overlay_packages = ["ros_overlay"]
//!
//! # packages linked from a system installation instead of built
//! [[system_packages]]
//! name = "pygtk"
//! source_dir = "/usr/lib/python2.7/dist-packages"
//! files = ["pygtk.py", "pygtk.pyc", "gtk-2.0", "glib", "gobject", "cairo"]
//! pth = "gtk-2.0"
//! ```
//!
//! The file is read once into a [`SettingsFile`], merged with command-line
//! [`SettingsOverrides`] and frozen into an immutable [`Settings`] that the
//! installer and builders receive by reference.

use crate::constants::{
    DEFAULT_CACHE_DIR, DEFAULT_FIND_LINKS, DEFAULT_OVERLAY_PACKAGES, SETTINGS_FILE,
};
use crate::core::RobustusError;
use crate::core::file_error::{FileOperation, FileResultExt};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A package provided by the host system and linked into the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPackage {
    /// Requirement name this entry handles, matched case-insensitively.
    pub name: String,
    /// Directory holding the system installation.
    pub source_dir: PathBuf,
    /// Entries of `source_dir` to link into site-packages.
    pub files: Vec<String>,
    /// Optional site-packages subdirectory registered through `<name>.pth`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pth: Option<String>,
}

/// On-disk form of `.robustus`; every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find_links: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_packages: Option<Vec<String>>,
    /// site-packages directory, relative to the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_packages: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_packages: Vec<SystemPackage>,
}

impl SettingsFile {
    /// The file written into a freshly initialized environment.
    pub fn initial() -> Self {
        Self {
            cache: Some(DEFAULT_CACHE_DIR.to_string()),
            find_links: Some(DEFAULT_FIND_LINKS.iter().map(|s| (*s).to_string()).collect()),
            ..Self::default()
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.with_file_context(
            FileOperation::Read,
            path,
            "robustus settings",
        )?;
        toml::from_str(&content)
            .map_err(RobustusError::from)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        tokio::fs::write(path, content).await.with_file_context(
            FileOperation::Write,
            path,
            "robustus settings",
        )?;
        Ok(())
    }
}

/// Command-line values that take precedence over `.robustus`.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub cache: Option<PathBuf>,
    /// Appended to the configured locations.
    pub find_links: Vec<String>,
    pub no_index: bool,
    pub update_editables: bool,
    pub verbosity: u8,
}

/// Immutable settings of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub env_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub find_links: Vec<String>,
    pub no_index: bool,
    pub update_editables: bool,
    pub overlay_packages: Vec<String>,
    pub site_packages: Option<PathBuf>,
    pub system_packages: Vec<SystemPackage>,
    /// 0 = quiet pip, 1 = build logs, 2+ = all pip output.
    pub verbosity: u8,
}

impl Settings {
    /// Defaults for `env_dir` without reading any file.
    pub fn new(env_dir: impl Into<PathBuf>) -> Self {
        let env_dir = env_dir.into();
        Self {
            cache_dir: env_dir.join(DEFAULT_CACHE_DIR),
            env_dir,
            find_links: DEFAULT_FIND_LINKS.iter().map(|s| (*s).to_string()).collect(),
            no_index: false,
            update_editables: false,
            overlay_packages: DEFAULT_OVERLAY_PACKAGES.iter().map(|s| (*s).to_string()).collect(),
            site_packages: None,
            system_packages: Vec::new(),
            verbosity: 0,
        }
    }

    /// Merges `file` and `overrides` on top of the defaults.
    pub fn from_parts(
        env_dir: impl Into<PathBuf>,
        file: SettingsFile,
        overrides: SettingsOverrides,
    ) -> Self {
        let mut settings = Self::new(env_dir);

        if let Some(cache) = overrides.cache {
            settings.cache_dir = settings.env_dir.join(cache);
        } else if let Some(cache) = file.cache {
            settings.cache_dir = settings.env_dir.join(shellexpand::tilde(&cache).as_ref());
        }
        if let Some(find_links) = file.find_links {
            settings.find_links = find_links;
        }
        settings.find_links.extend(overrides.find_links);
        if let Some(overlays) = file.overlay_packages {
            settings.overlay_packages = overlays;
        }
        settings.site_packages = file.site_packages.map(|p| settings.env_dir.join(p));
        settings.system_packages = file.system_packages;
        settings.no_index = overrides.no_index;
        settings.update_editables = overrides.update_editables;
        settings.verbosity = overrides.verbosity;
        settings
    }

    /// Loads `<env_dir>/.robustus` and applies `overrides`.
    ///
    /// # Errors
    ///
    /// [`RobustusError::EnvironmentNotFound`] when the settings file is
    /// missing, and a parse error when it is not valid TOML.
    pub async fn load(env_dir: &Path, overrides: SettingsOverrides) -> Result<Self> {
        let path = env_dir.join(SETTINGS_FILE);
        if !path.is_file() {
            return Err(RobustusError::EnvironmentNotFound {
                path: env_dir.display().to_string(),
                reason: format!("{SETTINGS_FILE} settings file not found"),
            }
            .into());
        }
        let file = SettingsFile::load_from(&path).await?;
        let settings = Self::from_parts(env_dir, file, overrides);
        tracing::info!("Robustus will use the following cache folder: {}", settings.cache_dir.display());
        Ok(settings)
    }

    /// `<env>/bin/<program>`.
    pub fn env_executable(&self, program: &str) -> PathBuf {
        let bin = if cfg!(windows) { "Scripts" } else { "bin" };
        self.env_dir.join(bin).join(program)
    }

    /// The environment's pip, checked for existence.
    pub fn pip_executable(&self) -> Result<PathBuf, RobustusError> {
        let pip = self.env_executable("pip");
        if pip.is_file() {
            Ok(pip)
        } else {
            Err(RobustusError::EnvironmentNotFound {
                path: self.env_dir.display().to_string(),
                reason: "pip not found".to_string(),
            })
        }
    }

    /// The site-packages directory: configured, or the first
    /// `lib/python*/site-packages` inside the environment.
    pub fn site_packages_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.site_packages {
            return Ok(dir.clone());
        }
        let pattern = format!(
            "{}/lib/python*/site-packages",
            glob::Pattern::escape(&self.env_dir.display().to_string())
        );
        glob::glob(&pattern)
            .context("Invalid environment path")?
            .filter_map(std::result::Result::ok)
            .find(|p| p.is_dir())
            .ok_or_else(|| {
                RobustusError::EnvironmentNotFound {
                    path: self.env_dir.display().to_string(),
                    reason: "no lib/python*/site-packages directory".to_string(),
                }
                .into()
            })
    }

    /// Directory pip checks editable sources out into.
    pub fn editable_src_dir(&self) -> PathBuf {
        self.env_dir.join("src")
    }
}

/// Directory for state shared between environments, such as bare clones of
/// editable repositories.
///
/// `ROBUSTUS_CACHE_DIR` overrides the platform cache directory.
pub fn get_cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("ROBUSTUS_CACHE_DIR") {
        return Ok(PathBuf::from(dir));
    }

    let cache_dir = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .ok_or_else(|| anyhow::anyhow!("Unable to determine cache directory"))?
        .join("robustus");

    if !cache_dir.exists() {
        std::fs::create_dir_all(&cache_dir).with_file_context(
            FileOperation::CreateDir,
            &cache_dir,
            "creating cache directory",
        )?;
    }
    Ok(cache_dir)
}
