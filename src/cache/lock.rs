//! Cross-process locks on cache fingerprints.
//!
//! Two robustus processes sharing a wheelhouse must not build the same
//! fingerprint at the same time. Each build holds an exclusive OS file lock on
//! `{cache_dir}/.locks/{fingerprint}.lock` until the record is final; the lock
//! is released when the [`CacheLock`] is dropped.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the cache root that holds lock files.
pub const LOCKS_DIR: &str = ".locks";

/// An exclusive lock on one cache fingerprint.
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Acquires the lock for `name`, waiting at most `wait`.
    ///
    /// The blocking `flock` runs on the blocking thread pool so the runtime
    /// keeps serving other tasks while another process finishes its build.
    ///
    /// ```rust,no_run
    /// use robustus::cache::lock::CacheLock;
    /// use std::path::Path;
    /// use std::time::Duration;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let lock = CacheLock::acquire(Path::new("/env/wheelhouse"), "numpy__1_7_2", Duration::from_secs(60)).await?;
    /// // build numpy==1.7.2 ...
    /// drop(lock);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Fails when the locks directory cannot be created, the lock file cannot
    /// be opened, or the lock is still held by someone else after `wait`.
    pub async fn acquire(cache_dir: &Path, name: &str, wait: Duration) -> Result<Self> {
        let lock_path = Self::lock_path(cache_dir, name).await?;
        let blocking_path = lock_path.clone();
        let lock_name = name.to_string();

        let locking = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = open_lock_file(&blocking_path)?;
            file.lock_exclusive().with_context(|| format!("Failed to acquire lock for: {lock_name}"))?;
            Ok(file)
        });

        let file = match tokio::time::timeout(wait, locking).await {
            Ok(joined) => joined.context("Failed to spawn blocking task for lock acquisition")??,
            Err(_) => anyhow::bail!(
                "Timed out after {}s waiting for cache lock {}; another robustus process may be building it",
                wait.as_secs(),
                lock_path.display()
            ),
        };

        tracing::trace!("Acquired cache lock {}", lock_path.display());
        Ok(Self {
            file,
            path: lock_path,
        })
    }

    /// Takes the lock for `name` only if nobody holds it; `Ok(None)` when
    /// it is taken.
    pub async fn try_acquire(cache_dir: &Path, name: &str) -> Result<Option<Self>> {
        let lock_path = Self::lock_path(cache_dir, name).await?;
        let blocking_path = lock_path.clone();

        let file = tokio::task::spawn_blocking(move || -> Result<Option<File>> {
            let file = open_lock_file(&blocking_path)?;
            let locked = file
                .try_lock_exclusive()
                .with_context(|| format!("Failed to try lock {}", blocking_path.display()))?;
            Ok(locked.then_some(file))
        })
        .await
        .context("Failed to spawn blocking task for lock acquisition")??;

        Ok(file.map(|file| Self {
            file,
            path: lock_path,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `{cache_dir}/.locks/{name}.lock`, creating the locks directory.
    async fn lock_path(cache_dir: &Path, name: &str) -> Result<PathBuf> {
        let locks_dir = cache_dir.join(LOCKS_DIR);
        tokio::fs::create_dir_all(&locks_dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                anyhow::anyhow!(
                    "Permission denied: cannot create locks directory at {}",
                    locks_dir.display()
                )
            } else {
                anyhow::anyhow!("Failed to create directory {}: {}", locks_dir.display(), e)
            }
        })?;
        Ok(locks_dir.join(format!("{name}.lock")))
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {}", path.display()))
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::TempDir;
    use tokio::sync::Barrier;

    const WAIT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_acquire_creates_lock_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path();
        assert!(!cache_dir.join(LOCKS_DIR).exists());

        let lock = CacheLock::acquire(cache_dir, "numpy__1_7_2", WAIT).await.unwrap();
        let lock_path = cache_dir.join(LOCKS_DIR).join("numpy__1_7_2.lock");
        assert_eq!(lock.path(), lock_path);
        assert!(lock_path.exists());

        drop(lock);
        // The file outlives the lock.
        assert!(lock_path.exists());
    }

    #[tokio::test]
    async fn test_same_fingerprint_blocks() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = Arc::new(temp_dir.path().to_path_buf());
        let barrier = Arc::new(Barrier::new(2));

        let holder_dir = cache_dir.clone();
        let holder_barrier = barrier.clone();
        let holder = tokio::spawn(async move {
            let _lock = CacheLock::acquire(&holder_dir, "scipy", WAIT).await.unwrap();
            holder_barrier.wait().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let waiter = tokio::spawn(async move {
            barrier.wait().await;
            let start = Instant::now();
            let _lock = CacheLock::acquire(&cache_dir, "scipy", WAIT).await.unwrap();
            assert!(start.elapsed() >= Duration::from_millis(50));
        });

        holder.await.unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_try_acquire_does_not_wait() {
        let temp_dir = TempDir::new().unwrap();
        let held = CacheLock::acquire(temp_dir.path(), "pyside__1_2_1", WAIT).await.unwrap();

        let start = Instant::now();
        assert!(CacheLock::try_acquire(temp_dir.path(), "pyside__1_2_1").await.unwrap().is_none());
        assert!(start.elapsed() < WAIT);

        drop(held);
        assert!(CacheLock::try_acquire(temp_dir.path(), "pyside__1_2_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_times_out_while_held() {
        let temp_dir = TempDir::new().unwrap();
        let _held = CacheLock::acquire(temp_dir.path(), "opencv", WAIT).await.unwrap();

        let error = CacheLock::acquire(temp_dir.path(), "opencv", Duration::from_millis(100))
            .await
            .err()
            .unwrap();
        assert!(error.to_string().contains("Timed out"));
    }
}
