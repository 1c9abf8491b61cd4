//! Fluent builder for system `git` invocations.
//!
//! Every git call robustus makes goes through [`GitCommand`], which applies a
//! timeout, captures output, logs under the `git` tracing target and maps
//! failures onto [`RobustusError`] variants.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::{GIT_CLONE_TIMEOUT, GIT_COMMAND_TIMEOUT, GIT_FETCH_TIMEOUT};
use crate::core::RobustusError;

/// Platform-specific git executable name.
pub const fn git_executable() -> &'static str {
    if cfg!(windows) { "git.exe" } else { "git" }
}

/// Builder for one git command.
///
/// ```rust,no_run
/// use robustus::git::command_builder::GitCommand;
///
/// # async fn example() -> anyhow::Result<()> {
/// let output = GitCommand::show("master", "requirements.txt")
///     .current_dir("/home/me/.cache/robustus/repos/0123abcd")
///     .execute()
///     .await?;
/// let lines: Vec<&str> = output.stdout.lines().collect();
/// # Ok(())
/// # }
/// ```
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout_duration: Option<Duration>,
    /// Included in log lines to tell concurrent repositories apart.
    context: Option<String>,
    /// For clone commands, the URL reported on failure.
    clone_url: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            timeout_duration: Some(GIT_COMMAND_TIMEOUT),
            context: None,
            clone_url: None,
        }
    }
}

impl GitCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the command with `git -C <dir>`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the timeout (`None` waits forever).
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Tags log lines with `context`, typically the repository link.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Executes the command and returns its captured output.
    ///
    /// # Errors
    ///
    /// [`RobustusError::GitNotFound`] when git cannot be spawned,
    /// [`RobustusError::GitCloneFailed`] for a failed clone and
    /// [`RobustusError::GitCommandError`] for any other non-zero exit or a
    /// timeout.
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let start = std::time::Instant::now();
        let git = git_executable();

        let mut full_args = Vec::new();
        if let Some(dir) = &self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());
        let operation = self.args.first().cloned().unwrap_or_else(|| "unknown".to_string());
        let prefix = self.context.as_deref().map(|ctx| format!("({ctx}) ")).unwrap_or_default();

        tracing::debug!(target: "git", "{prefix}Executing command: {git} {}", full_args.join(" "));

        let mut cmd = Command::new(git);
        cmd.args(&full_args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        // Never block on a credential prompt.
        cmd.env("GIT_TERMINAL_PROMPT", "0");

        let output_future = cmd.output();
        let spawned = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "git",
                        "{prefix}Command timed out after {} seconds: git {}",
                        duration.as_secs(),
                        full_args.join(" ")
                    );
                    return Err(RobustusError::GitCommandError {
                        operation,
                        stderr: format!(
                            "git command timed out after {} seconds; check network access and \
                             credentials, then try running it manually: git {}",
                            duration.as_secs(),
                            full_args.join(" ")
                        ),
                    }
                    .into());
                }
            },
            None => output_future.await,
        };

        let output = match spawned {
            Ok(output) => output,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(RobustusError::GitNotFound.into());
            }
            Err(error) => {
                return Err(error).context(format!("Failed to execute git {}", full_args.join(" ")));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "{prefix}Command failed with exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
            let error = match self.clone_url {
                Some(url) => RobustusError::GitCloneFailed {
                    url,
                    reason: stderr,
                },
                None => RobustusError::GitCommandError {
                    operation,
                    stderr: if stderr.is_empty() { stdout } else { stderr },
                },
            };
            return Err(error.into());
        }

        if !stderr.trim().is_empty() {
            tracing::trace!(target: "git", "{prefix}{}", stderr.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "git::perf", "{prefix}Git {operation} took {:.2}s", elapsed.as_secs_f64());
        } else if elapsed.as_millis() > 100 {
            tracing::debug!(target: "git::perf", "{prefix}Git {operation} took {}ms", elapsed.as_millis());
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// Captured output of a finished git command.
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitCommand {
    /// `git clone --bare <url> <target>`
    pub fn clone_bare(url: &str, target: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new()
            .args(["clone", "--bare", "--quiet", url])
            .arg(target.as_ref().display().to_string())
            .with_timeout(Some(GIT_CLONE_TIMEOUT));
        cmd.clone_url = Some(url.to_string());
        cmd
    }

    /// Updates every branch and tag of a bare clone from `origin`.
    pub fn fetch() -> Self {
        Self::new()
            .args(["fetch", "--quiet", "--tags", "--force", "--prune", "origin"])
            .arg("+refs/heads/*:refs/heads/*")
            .with_timeout(Some(GIT_FETCH_TIMEOUT))
    }

    /// `git show <revision>:<path>`
    pub fn show(revision: &str, path: &str) -> Self {
        Self::new().args(["show", &format!("{revision}:{path}")])
    }

    /// `git rev-parse --verify --quiet <revision>^{commit}`
    pub fn verify_commit(revision: &str) -> Self {
        Self::new().args(["rev-parse", "--verify", "--quiet", &format!("{revision}^{{commit}}")])
    }

    /// `git cat-file -e <revision>:<path>`, succeeding iff the blob exists.
    pub fn path_exists(revision: &str, path: &str) -> Self {
        Self::new().args(["cat-file", "-e", &format!("{revision}:{path}")])
    }
}
