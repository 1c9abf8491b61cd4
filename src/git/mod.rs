//! Reading files out of git repositories with the system `git`.
//!
//! Editable requirements such as
//! `-e git+https://github.com/company/my_package@branch_name#egg=my_package`
//! are expanded through the `requirements.txt` at the root of their
//! repository. [`GitFetcher`] keeps one bare clone per repository link under
//! a shared cache directory, refreshes it at most once per run and reads
//! files with `git show <ref>:<path>`, so no working tree is ever checked out.

pub mod command_builder;

use crate::cache::lock::CacheLock;
use crate::constants::DEFAULT_LOCK_TIMEOUT;
use crate::core::RobustusError;
use crate::resolver::ContentFetcher;
use anyhow::Result;
use async_trait::async_trait;
use command_builder::{GitCommand, git_executable};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Checks that git can be found on `PATH`.
///
/// # Errors
///
/// [`RobustusError::GitNotFound`] when it cannot.
pub fn ensure_git_available() -> Result<()> {
    which::which(git_executable()).map_err(|_| RobustusError::GitNotFound)?;
    Ok(())
}

/// [`ContentFetcher`] backed by bare clones in `repos_dir`.
pub struct GitFetcher {
    repos_dir: PathBuf,
    /// Clones already brought up to date during this run.
    refreshed: Mutex<HashSet<String>>,
}

impl GitFetcher {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            refreshed: Mutex::new(HashSet::new()),
        }
    }

    /// Directory name of the bare clone of `link`.
    pub fn clone_name(link: &str) -> String {
        let digest = Sha256::digest(link.as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    pub fn clone_path(&self, link: &str) -> PathBuf {
        self.repos_dir.join(Self::clone_name(link))
    }

    /// Clones `link` on first use and fetches it once per run afterwards.
    async fn refresh(&self, link: &str) -> Result<PathBuf> {
        let name = Self::clone_name(link);
        let path = self.repos_dir.join(&name);

        let mut refreshed = self.refreshed.lock().await;
        if refreshed.contains(&name) {
            return Ok(path);
        }

        ensure_git_available()?;
        tokio::fs::create_dir_all(&self.repos_dir).await?;
        // Another process may be cloning the same repository.
        let _lock = CacheLock::acquire(&self.repos_dir, &name, DEFAULT_LOCK_TIMEOUT).await?;

        if path.join("HEAD").exists() {
            tracing::debug!(target: "git", "Fetching {link} into {}", path.display());
            GitCommand::fetch().current_dir(&path).with_context(link).execute_success().await?;
        } else {
            if path.exists() {
                // Leftover of an interrupted clone.
                tokio::fs::remove_dir_all(&path).await?;
            }
            tracing::info!(target: "git", "Cloning {link}");
            if let Err(error) = GitCommand::clone_bare(link, &path).with_context(link).execute_success().await {
                let _ = tokio::fs::remove_dir_all(&path).await;
                return Err(error);
            }
        }

        refreshed.insert(name);
        Ok(path)
    }

    async fn read_file(&self, link: &str, reference: Option<&str>, path: &str) -> Result<Option<Vec<String>>> {
        let clone = self.refresh(link).await?;
        let revision = reference.unwrap_or("HEAD");

        if GitCommand::verify_commit(revision).current_dir(&clone).with_context(link).execute_success().await.is_err() {
            return Err(RobustusError::GitCommandError {
                operation: "rev-parse".to_string(),
                stderr: format!("unknown revision {revision} in {link}"),
            }
            .into());
        }

        if GitCommand::path_exists(revision, path).current_dir(&clone).with_context(link).execute_success().await.is_err() {
            tracing::debug!(target: "git", "{link}@{revision} has no {path}");
            return Ok(None);
        }

        let output = GitCommand::show(revision, path).current_dir(&clone).with_context(link).execute().await?;
        Ok(Some(output.stdout.lines().map(str::to_string).collect()))
    }

    pub fn repos_dir(&self) -> &Path {
        &self.repos_dir
    }
}

#[async_trait]
impl ContentFetcher for GitFetcher {
    async fn fetch(&self, link: &str, reference: Option<&str>, path: &str) -> Result<Option<Vec<String>>> {
        self.read_file(link, reference, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=robustus", "-c", "user.email=robustus@example.com"])
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    /// A repository with requirements on `master` and none on `bare`.
    fn origin(temp: &TempDir) -> PathBuf {
        let origin = temp.path().join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        git(&origin, &["init", "--quiet", "--initial-branch=master"]);
        std::fs::write(origin.join("requirements.txt"), "numpy==1.7.2\n# comment\nscipy\n").unwrap();
        git(&origin, &["add", "."]);
        git(&origin, &["commit", "--quiet", "-m", "requirements"]);
        git(&origin, &["checkout", "--quiet", "-b", "bare"]);
        git(&origin, &["rm", "--quiet", "requirements.txt"]);
        git(&origin, &["commit", "--quiet", "-m", "drop requirements"]);
        git(&origin, &["checkout", "--quiet", "master"]);
        origin
    }

    #[test]
    fn test_clone_name_is_stable() {
        let a = GitFetcher::clone_name("https://github.com/company/my_package");
        assert_eq!(a.len(), 16);
        assert_eq!(a, GitFetcher::clone_name("https://github.com/company/my_package"));
        assert_ne!(a, GitFetcher::clone_name("https://github.com/company/other"));
    }

    #[tokio::test]
    async fn test_fetch_from_branch() {
        if ensure_git_available().is_err() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let origin = origin(&temp);
        let link = origin.display().to_string();
        let fetcher = GitFetcher::new(temp.path().join("repos"));

        let lines = fetcher.fetch(&link, Some("master"), "requirements.txt").await.unwrap().unwrap();
        assert_eq!(lines, vec!["numpy==1.7.2", "# comment", "scipy"]);
        assert!(fetcher.clone_path(&link).join("HEAD").exists());

        let default = fetcher.fetch(&link, None, "requirements.txt").await.unwrap();
        assert!(default.is_some());

        let missing = fetcher.fetch(&link, Some("bare"), "requirements.txt").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_unknown_reference_is_an_error() {
        if ensure_git_available().is_err() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let origin = origin(&temp);
        let fetcher = GitFetcher::new(temp.path().join("repos"));

        let error = fetcher
            .fetch(&origin.display().to_string(), Some("no_such_branch"), "requirements.txt")
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RobustusError>(),
            Some(RobustusError::GitCommandError { .. })
        ));
    }

    #[tokio::test]
    async fn test_clone_failure_leaves_no_directory() {
        if ensure_git_available().is_err() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("does_not_exist").display().to_string();
        let fetcher = GitFetcher::new(temp.path().join("repos"));

        let error = fetcher.fetch(&link, None, "requirements.txt").await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RobustusError>(),
            Some(RobustusError::GitCloneFailed { .. })
        ));
        assert!(!fetcher.clone_path(&link).exists());
    }
}
