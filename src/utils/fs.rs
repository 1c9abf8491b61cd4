//! Filesystem operations with atomic writes.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Creates `path` and its parents if missing.
///
/// # Errors
///
/// Fails when a component exists but is not a directory, or on permission
/// problems.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).with_context(|| {
            format!(
                "Failed to create directory: {}\n\nCheck directory permissions and path validity",
                path.display()
            )
        })?;
    } else if !path.is_dir() {
        anyhow::bail!("Path exists but is not a directory: {}", path.display());
    }
    Ok(())
}

/// Atomically replaces `path` with `content`.
///
/// The bytes go to a uniquely named temporary file in the same directory,
/// which is synced and then renamed over `path`, so a reader sees either the
/// old content or the new content and never a partial record.
///
/// ```rust,no_run
/// use robustus::utils::atomic_write;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// atomic_write(Path::new("wheelhouse/numpy__1_7_2.rob"), b"{}")?;
/// # Ok(())
/// # }
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    ensure_dir(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for: {}", path.display()))?;
    temp.as_file().sync_all().context("Failed to sync file to disk")?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Points `link` at `target`, replacing whatever `link` was before.
#[cfg(unix)]
pub fn replace_with_symlink(target: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        ensure_dir(parent)?;
    }
    if link.symlink_metadata().is_ok() {
        if link.is_dir() && !link.is_symlink() {
            fs::remove_dir_all(link)
        } else {
            fs::remove_file(link)
        }
        .with_context(|| format!("Failed to remove existing {}", link.display()))?;
    }
    std::os::unix::fs::symlink(target, link).with_context(|| {
        format!("Failed to link {} -> {}", link.display(), target.display())
    })
}

/// Points `link` at `target`, replacing whatever `link` was before.
#[cfg(not(unix))]
pub fn replace_with_symlink(target: &Path, link: &Path) -> Result<()> {
    anyhow::bail!(
        "Linking {} -> {} requires a Unix platform",
        link.display(),
        target.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents_and_replaces() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wheelhouse").join("scipy.rob");

        atomic_write(&path, b"first").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");

        // No temp files left behind.
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_ensure_dir_rejects_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(ensure_dir(&file).is_err());
        ensure_dir(&temp.path().join("a/b/c")).unwrap();
        assert!(temp.path().join("a/b/c").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_with_symlink() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("system/gtk");
        fs::create_dir_all(&target).unwrap();
        let link = temp.path().join("env/site-packages/gtk");
        fs::create_dir_all(&link).unwrap();

        replace_with_symlink(&target, &link).unwrap();
        assert!(link.is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), target);

        // Idempotent over an existing link.
        replace_with_symlink(&target, &link).unwrap();
        assert!(link.is_symlink());
    }
}
