//! robustus installs Python requirements into a virtualenv through a cache of
//! prebuilt wheels.
//!
//! Requirements arrive as pip-style specifiers on the command line or in
//! requirement files. Editable requirements hosted in git repositories (or
//! local directories) are expanded through their own `requirements.txt`, the
//! combined list is deduplicated, and every entry is installed so that each
//! `(name, version)` or source location is compiled at most once across all
//! runs sharing a cache.
//!
//! # Pipeline
//!
//! ```text
//! specifier text ─▶ requirement::parse ─▶ resolver::ResolutionContext ─▶ resolver::dedup
//!                                                 │                            │
//!                                         git::GitFetcher             installer::Installer
//!                                                                        │          │
//!                                                                 cache::CacheIndex builder::BuilderRegistry
//! ```
//!
//! # Modules
//!
//! - [`requirement`] - the requirement model and specifier grammar
//! - [`resolver`] - editable expansion and deduplication
//! - [`git`] - reading `requirements.txt` out of remote repositories
//! - [`cache`] - cache records, fingerprints and cross-process locks
//! - [`builder`] - pip wheel builds and system-linked packages
//! - [`installer`] - the build-once orchestration
//! - [`config`] - per-environment settings
//! - [`cli`] - the `robustus` command

// Core functionality modules
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod requirement;
pub mod resolver;

// Git integration
pub mod git;

// Building and installing
pub mod builder;
pub mod installer;

// Supporting modules
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
