//! Filesystem helpers shared by the cache and the builders.
//!
//! - [`fs`] - directory creation, atomic writes and symlinking

pub mod fs;

pub use fs::{atomic_write, ensure_dir, replace_with_symlink};
