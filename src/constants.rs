//! Constants shared across robustus modules.
//!
//! Timeouts, default settings values and file names live here so that magic
//! numbers and paths are discoverable in one place.

use std::time::Duration;

/// Default timeout for acquiring a per-fingerprint cache lock (30 minutes).
///
/// Another process holding the lock is usually compiling the same wheel, and
/// native builds such as numpy or scipy can take many minutes.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Timeout for git fetch operations (60 seconds).
///
/// Prevents a hung network connection from blocking expansion indefinitely.
pub const GIT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for git clone operations (120 seconds).
pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for local git commands such as `show` (30 seconds).
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the settings file at the root of a robustus environment.
pub const SETTINGS_FILE: &str = ".robustus";

/// Default cache directory, relative to the environment.
pub const DEFAULT_CACHE_DIR: &str = "wheelhouse";

/// Package index searched by `pip download` when no `find_links` are set.
pub const DEFAULT_FIND_LINKS: &[&str] = &["http://thirdparty-packages.braincorporation.net"];

/// Package names whose version slot holds a location.
pub const DEFAULT_OVERLAY_PACKAGES: &[&str] = &["ros_overlay"];

/// Environment directory used when neither `--env` nor a virtualenv is active.
pub const DEFAULT_ENV_DIR: &str = ".env";
