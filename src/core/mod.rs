//! Core types shared by every robustus module.
//!
//! - [`RobustusError`] - typed failure modes (specifier parsing, editable
//!   expansion, builds, cache records, git)
//! - [`ErrorContext`] / [`user_friendly_error`] - terminal rendering with
//!   suggestions
//! - [`file_error`] - I/O errors annotated with the file and purpose

pub mod error;
pub mod file_error;

pub use error::{ErrorContext, RobustusError, user_friendly_error};
pub use file_error::{FileOperation, FileOperationError, FileResultExt};
