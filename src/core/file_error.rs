//! Structured context for filesystem failures.
//!
//! Wraps [`std::io::Error`] with the operation, the path and the purpose of the
//! access so that a failed cache or settings read tells the user which file was
//! involved and why robustus was touching it.

use std::path::PathBuf;
use thiserror::Error;

/// Kind of filesystem access that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Remove,
    CreateDir,
    ListDir,
    Link,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Remove => write!(f, "removing"),
            FileOperation::CreateDir => write!(f, "creating directory"),
            FileOperation::ListDir => write!(f, "listing directory"),
            FileOperation::Link => write!(f, "linking"),
        }
    }
}

/// An I/O error annotated with what robustus was doing at the time.
#[derive(Error, Debug)]
#[error("Failed {operation} '{}' for {purpose}", file_path.display())]
pub struct FileOperationError {
    pub operation: FileOperation,
    pub file_path: PathBuf,
    pub purpose: String,
    #[source]
    pub source: std::io::Error,
}

impl FileOperationError {
    /// Multi-line message with a hint based on the I/O error kind.
    pub fn user_message(&self) -> String {
        let mut message = self.to_string();
        match self.source.kind() {
            std::io::ErrorKind::NotFound => {
                message.push_str("\n\nThe file does not exist at the specified path.");
            }
            std::io::ErrorKind::PermissionDenied => {
                message.push_str(&format!(
                    "\n\nPermission denied. Check file/directory permissions for: {}",
                    self.file_path.display()
                ));
            }
            std::io::ErrorKind::InvalidData => {
                message.push_str("\n\nThe file contains invalid data or encoding.");
            }
            _ => {
                message.push_str(&format!("\n\nError details: {}", self.source));
            }
        }
        message
    }
}

/// Extension trait attaching [`FileOperationError`] context to I/O results.
pub trait FileResultExt<T> {
    fn with_file_context(
        self,
        operation: FileOperation,
        file_path: impl Into<PathBuf>,
        purpose: impl Into<String>,
    ) -> Result<T, FileOperationError>;
}

impl<T> FileResultExt<T> for Result<T, std::io::Error> {
    fn with_file_context(
        self,
        operation: FileOperation,
        file_path: impl Into<PathBuf>,
        purpose: impl Into<String>,
    ) -> Result<T, FileOperationError> {
        self.map_err(|source| FileOperationError {
            operation,
            file_path: file_path.into(),
            purpose: purpose.into(),
            source,
        })
    }
}
