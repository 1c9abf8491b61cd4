//! Fluent builder for `pip` invocations inside an environment.
//!
//! Mirrors [`GitCommand`](crate::git::command_builder::GitCommand): arguments
//! are collected first, the process runs with captured output and every line
//! is logged under the `pip` tracing target. Builds have no timeout since
//! native packages can compile for a long time.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::core::RobustusError;

/// One pip command.
pub struct PipCommand {
    program: PathBuf,
    args: Vec<String>,
    /// Log captured stdout at info level instead of debug.
    echo: bool,
}

/// Captured output of a finished pip command.
#[derive(Debug)]
pub struct PipOutput {
    pub stdout: String,
    pub stderr: String,
}

impl PipCommand {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            echo: false,
        }
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

    pub const fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// The arguments collected so far.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Runs pip and returns its output.
    ///
    /// # Errors
    ///
    /// [`RobustusError::EnvironmentNotFound`] when the pip executable does not
    /// exist; otherwise an error carrying pip's stderr for a non-zero exit.
    pub async fn execute(self) -> Result<PipOutput> {
        let start = std::time::Instant::now();
        let operation = self.args.first().cloned().unwrap_or_else(|| "unknown".to_string());
        tracing::debug!(target: "pip", "Executing command: {} {}", self.program.display(), self.args.join(" "));

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match spawned {
            Ok(output) => output,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(RobustusError::EnvironmentNotFound {
                    path: self.program.display().to_string(),
                    reason: "pip not found".to_string(),
                }
                .into());
            }
            Err(error) => {
                return Err(error).with_context(|| format!("Failed to execute pip {}", self.args.join(" ")));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            if self.echo {
                tracing::info!(target: "pip", "{line}");
            } else {
                tracing::debug!(target: "pip", "{line}");
            }
        }

        if !output.status.success() {
            tracing::debug!(target: "pip", "Command failed with exit code {:?}: {}", output.status.code(), stderr.trim());
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            anyhow::bail!(
                "pip {operation} exited with {}: {}",
                output.status.code().map_or_else(|| "a signal".to_string(), |c| format!("code {c}")),
                last_lines(detail, 20)
            );
        }

        tracing::debug!(target: "pip::perf", "pip {operation} took {:.2}s", start.elapsed().as_secs_f64());
        Ok(PipOutput {
            stdout,
            stderr,
        })
    }

    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// The final `count` lines of `text`, where pip puts the actual failure.
fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}
