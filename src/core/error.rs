//! Error handling for robustus
//!
//! This module provides the typed error enum used throughout the crate and the
//! user-facing rendering of those errors for the CLI. The design follows two
//! rules:
//! 1. **Strongly-typed errors** for the failure modes callers branch on
//!    (malformed specifiers, missing egg fragments, build failures, ...)
//! 2. **User-friendly messages** with actionable suggestions when the error
//!    reaches the terminal
//!
//! # Error Categories
//!
//! - **Specifiers**: [`RobustusError::MalformedSpecifier`]
//! - **Editable expansion**: [`RobustusError::MissingEggFragment`],
//!   [`RobustusError::MissingRequirementsFile`]
//! - **Builds and cache**: [`RobustusError::BuildError`],
//!   [`RobustusError::CacheCorruption`], [`RobustusError::InstallError`]
//! - **Git**: [`RobustusError::GitNotFound`], [`RobustusError::GitCommandError`],
//!   [`RobustusError::GitCloneFailed`]
//! - **Environment and configuration**: [`RobustusError::EnvironmentNotFound`],
//!   [`RobustusError::ConfigError`], [`RobustusError::NoRequirements`]
//!
//! Every variant that originates from a requirement carries the specifier text
//! so the user can see exactly which line caused the failure.
//!
//! # Examples
//!
//! ```rust,no_run
//! use robustus::core::{RobustusError, user_friendly_error};
//!
//! let error = RobustusError::MalformedSpecifier {
//!     specifier: "numpy==".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for robustus operations.
///
/// Parse and expansion errors abort a run before any build is attempted.
/// [`BuildError`](RobustusError::BuildError) is local to one fingerprint and is
/// wrapped in [`InstallError`](RobustusError::InstallError) by the installer.
#[derive(Error, Debug)]
pub enum RobustusError {
    /// Specifier text matches neither the URI grammar nor `name[==|>=version]`.
    #[error("invalid requirement specified \"{specifier}\"")]
    MalformedSpecifier {
        /// The offending text, trimmed
        specifier: String,
    },

    /// An editable git link without `#egg=<name>`.
    #[error("editable git link {specifier} has to contain egg information")]
    MissingEggFragment {
        /// The offending specifier
        specifier: String,
    },

    /// An editable requirement whose repository has no `requirements.txt`.
    #[error("editable requirement {specifier} does not have a requirements.txt file")]
    MissingRequirementsFile {
        /// The editable requirement that was expanded
        specifier: String,
    },

    /// A builder collaborator failed to produce or install an artifact.
    #[error("failed to build {specifier}: {reason}")]
    BuildError {
        /// The requirement being built
        specifier: String,
        /// What the builder reported
        reason: String,
    },

    /// A cache record exists but cannot be read back.
    ///
    /// The installer treats this as a cache miss and rebuilds.
    #[error("corrupted cache record {path}: {reason}")]
    CacheCorruption {
        /// Path of the unreadable record
        path: String,
        /// Why the record was rejected
        reason: String,
    },

    /// Top-level wrapper for any failure while installing one requirement.
    #[error("failed to install {specifier}")]
    InstallError {
        /// The requirement that failed
        specifier: String,
        /// Underlying failure
        #[source]
        source: Box<RobustusError>,
    },

    /// No requirement was given on the command line or in files.
    #[error("you must give at least one requirement to install")]
    NoRequirements,

    /// The target directory is not a robustus environment.
    #[error("bad robustus environment {path}: {reason}")]
    EnvironmentNotFound {
        /// Environment directory that was inspected
        path: String,
        /// What was missing
        reason: String,
    },

    /// Git executable not found in PATH
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// Git operation failed during execution
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation that failed (e.g., "clone", "fetch", "show")
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// Git repository clone failed
    #[error("Failed to clone repository: {url}")]
    GitCloneFailed {
        /// The repository URL that failed to clone
        url: String,
        /// The reason for the clone failure
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl RobustusError {
    /// Wraps `self` as the cause of a failed install of `specifier`.
    #[must_use]
    pub fn into_install_error(self, specifier: impl Into<String>) -> Self {
        match self {
            already @ Self::InstallError {
                ..
            } => already,
            other => Self::InstallError {
                specifier: specifier.into(),
                source: Box::new(other),
            },
        }
    }

    /// The specifier text attached to this error, if any.
    #[must_use]
    pub fn specifier(&self) -> Option<&str> {
        match self {
            Self::MalformedSpecifier {
                specifier,
            }
            | Self::MissingEggFragment {
                specifier,
            }
            | Self::MissingRequirementsFile {
                specifier,
            }
            | Self::BuildError {
                specifier,
                ..
            }
            | Self::InstallError {
                specifier,
                ..
            } => Some(specifier),
            _ => None,
        }
    }
}

impl Clone for RobustusError {
    fn clone(&self) -> Self {
        match self {
            Self::MalformedSpecifier {
                specifier,
            } => Self::MalformedSpecifier {
                specifier: specifier.clone(),
            },
            Self::MissingEggFragment {
                specifier,
            } => Self::MissingEggFragment {
                specifier: specifier.clone(),
            },
            Self::MissingRequirementsFile {
                specifier,
            } => Self::MissingRequirementsFile {
                specifier: specifier.clone(),
            },
            Self::BuildError {
                specifier,
                reason,
            } => Self::BuildError {
                specifier: specifier.clone(),
                reason: reason.clone(),
            },
            Self::CacheCorruption {
                path,
                reason,
            } => Self::CacheCorruption {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::InstallError {
                specifier,
                source,
            } => Self::InstallError {
                specifier: specifier.clone(),
                source: source.clone(),
            },
            Self::NoRequirements => Self::NoRequirements,
            Self::EnvironmentNotFound {
                path,
                reason,
            } => Self::EnvironmentNotFound {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::GitNotFound => Self::GitNotFound,
            Self::GitCommandError {
                operation,
                stderr,
            } => Self::GitCommandError {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::GitCloneFailed {
                url,
                reason,
            } => Self::GitCloneFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            // For errors that don't implement Clone, convert to Other
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::TomlError(e) => Self::Other {
                message: format!("TOML parsing error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information.
///
/// When displayed, errors show the main message in red, optional details in
/// yellow and an optional suggestion in green.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: RobustusError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: RobustusError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with suggestions.
///
/// Recognizes [`RobustusError`] anywhere in the `anyhow` chain, then
/// [`std::io::Error`] and TOML errors. Anything else is rendered with its full
/// cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(robustus_error) = cause.downcast_ref::<RobustusError>() {
            let mut ctx = create_error_context(robustus_error.clone());
            // Keep the outer anyhow context (e.g. "while reading requirements.txt")
            if error.chain().count() > 1 && ctx.details.is_none() {
                ctx.details = Some(error.to_string());
            }
            return ctx;
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(RobustusError::Other {
            message: error.to_string(),
        })
        .with_suggestion("Check ownership of the environment and cache directories")
        .with_details("robustus needs write access to the wheel cache and the virtualenv");
    }

    if let Some(file_error) = error.chain().find_map(|c| c.downcast_ref::<crate::core::FileOperationError>()) {
        return ErrorContext::new(RobustusError::Other {
            message: error.to_string(),
        })
        .with_details(file_error.user_message());
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(RobustusError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of the .robustus settings file");
    }

    // Generic error - include the full error chain for better diagnostics
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(RobustusError::Other {
        message,
    })
}

fn create_error_context(error: RobustusError) -> ErrorContext {
    match &error {
        RobustusError::MalformedSpecifier { .. } => ErrorContext::new(error)
            .with_suggestion("Use <name>, <name>==<version>, <name>>=<version> or a URL, optionally prefixed with -e"),

        RobustusError::MissingEggFragment { .. } => ErrorContext::new(error)
            .with_suggestion("Example: -e git+https://github.com/company/my_package@branch_name#egg=my_package"),

        RobustusError::MissingRequirementsFile { .. } => ErrorContext::new(error)
            .with_details("Editable repositories are expanded through the requirements.txt at their root")
            .with_suggestion("Add a requirements.txt to the repository, even an empty one"),

        RobustusError::BuildError { .. } | RobustusError::InstallError { .. } => {
            let details = match &error {
                RobustusError::InstallError { source, .. } => Some(source.to_string()),
                _ => None,
            };
            let ctx = ErrorContext::new(error)
                .with_suggestion("The cache record was removed so the next run rebuilds it. Re-run with -vv to see the build log");
            match details {
                Some(details) => ctx.with_details(details),
                None => ctx,
            }
        }

        RobustusError::EnvironmentNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Pass --env <dir> pointing at a virtualenv that contains a .robustus settings file"),

        RobustusError::NoRequirements => ErrorContext::new(error)
            .with_suggestion("See \"robustus install -h\""),

        RobustusError::GitNotFound => ErrorContext::new(error)
            .with_suggestion("Install git from https://git-scm.com/ or your package manager")
            .with_details("Editable git requirements are expanded with the system git"),

        RobustusError::GitCloneFailed { url, .. } => {
            let suggestion = format!(
                "Verify the repository URL is correct: {url}. Check your internet connection and repository access"
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        RobustusError::GitCommandError { stderr, .. } => {
            let details = stderr.trim().to_string();
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("Verify the branch, tag, or commit exists in the repository")
        }

        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_malformed_specifier_message() {
        let error = RobustusError::MalformedSpecifier {
            specifier: "numpy==".to_string(),
        };
        assert_eq!(error.to_string(), "invalid requirement specified \"numpy==\"");
        assert_eq!(error.specifier(), Some("numpy=="));
    }

    #[test]
    fn test_into_install_error_wraps_once() {
        let error = RobustusError::BuildError {
            specifier: "numpy==1.7.2".to_string(),
            reason: "pip exited with 1".to_string(),
        }
        .into_install_error("numpy==1.7.2")
        .into_install_error("numpy==1.7.2");

        match error {
            RobustusError::InstallError {
                specifier,
                source,
            } => {
                assert_eq!(specifier, "numpy==1.7.2");
                assert!(matches!(*source, RobustusError::BuildError { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_user_friendly_error_finds_typed_error_in_chain() {
        let error: anyhow::Result<()> = Err(RobustusError::MissingEggFragment {
            specifier: "-e git+https://h/p".to_string(),
        })
        .context("expanding requirements");

        let ctx = user_friendly_error(error.unwrap_err());
        assert!(matches!(ctx.error, RobustusError::MissingEggFragment { .. }));
        assert!(ctx.suggestion.unwrap().contains("#egg="));
        assert_eq!(ctx.details.as_deref(), Some("expanding requirements"));
    }

    #[test]
    fn test_user_friendly_error_generic_chain() {
        let error = anyhow::anyhow!("root cause").context("outer");
        let ctx = user_friendly_error(error);
        let rendered = ctx.to_string();
        assert!(rendered.contains("outer"));
        assert!(rendered.contains("Caused by:"));
        assert!(rendered.contains("root cause"));
    }

    #[test]
    fn test_user_friendly_error_explains_file_errors() {
        use crate::core::{FileOperation, FileResultExt};

        let io: std::io::Result<()> = Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let error = anyhow::Error::from(
            io.with_file_context(FileOperation::Read, "/env/.robustus", "robustus settings").unwrap_err(),
        )
        .context("loading settings");

        let ctx = user_friendly_error(error);
        assert!(ctx.details.unwrap().contains("does not exist"));
    }

    #[test]
    fn test_error_context_display_format() {
        let ctx = ErrorContext::new(RobustusError::NoRequirements)
            .with_details("nothing on the command line")
            .with_suggestion("pass -r requirements.txt");
        let rendered = ctx.to_string();
        assert!(rendered.starts_with("you must give at least one requirement"));
        assert!(rendered.contains("\nDetails: nothing on the command line"));
        assert!(rendered.contains("\nSuggestion: pass -r requirements.txt"));
    }
}
