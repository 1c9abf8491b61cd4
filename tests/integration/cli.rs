//! The `robustus` binary against a temporary environment.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use robustus::cache::lock::CacheLock;
use robustus::cache::{CacheIndex, CacheRecord, Fingerprint};
use robustus::requirement::Requirement;
use robustus::test_utils::TestEnv;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// `robustus --env <env>` with git clones kept out of the user's cache.
fn robustus(env: &Path, repos: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("robustus").expect("robustus binary builds");
    cmd.env_remove("VIRTUAL_ENV")
        .env_remove("RUST_LOG")
        .env("ROBUSTUS_CACHE_DIR", repos.path())
        .env("NO_COLOR", "1")
        .arg("--env")
        .arg(env);
    cmd
}

async fn cache(env: &TestEnv, specifiers: &[&str]) -> Result<()> {
    let index = CacheIndex::open(env.cache_dir())?;
    for specifier in specifiers {
        let requirement: Requirement = specifier.parse()?;
        index.write(&Fingerprint::of(&requirement), &CacheRecord::new(&requirement, "wheel", Vec::new())).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_freeze_lists_cached_requirements() -> Result<()> {
    let env = TestEnv::new()?;
    let repos = TempDir::new()?;
    cache(&env, &["numpy==1.7.2", "scipy==0.13.0"]).await?;

    robustus(env.path(), &repos)
        .arg("freeze")
        .assert()
        .success()
        .stdout(predicate::str::contains("numpy==1.7.2"))
        .stdout(predicate::str::contains("scipy==0.13.0"))
        .stdout(predicate::str::contains("Robustus will use").not());
    Ok(())
}

#[test]
fn test_install_without_requirements_fails() -> Result<()> {
    let env = TestEnv::new()?;
    let repos = TempDir::new()?;

    robustus(env.path(), &repos)
        .arg("install")
        .assert()
        .failure()
        .stderr(predicate::str::contains("you must give at least one requirement"));
    Ok(())
}

#[test]
fn test_missing_settings_file_is_a_bad_environment() -> Result<()> {
    let dir = TempDir::new()?;
    let repos = TempDir::new()?;

    robustus(dir.path(), &repos)
        .arg("freeze")
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad robustus environment"))
        .stderr(predicate::str::contains(".robustus settings file not found"));
    Ok(())
}

#[test]
fn test_resolve_prints_deduplicated_list() -> Result<()> {
    let env = TestEnv::new()?;
    let repos = TempDir::new()?;
    let file = env.path().join("requirements.txt");
    std::fs::write(&file, "# pins\nnumpy==1.7.1\nscipy==0.13.0\n\nnumpy==1.7.2\n")?;

    robustus(env.path(), &repos)
        .arg("resolve")
        .arg("-r")
        .arg(&file)
        .assert()
        .success()
        .stdout("scipy==0.13.0\nnumpy==1.7.2\n");
    Ok(())
}

#[tokio::test]
async fn test_cache_remove_deletes_the_record() -> Result<()> {
    let env = TestEnv::new()?;
    let repos = TempDir::new()?;
    cache(&env, &["numpy==1.7.2"]).await?;

    robustus(env.path(), &repos).args(["cache", "remove", "numpy==1.7.2"]).assert().success();
    assert!(CacheIndex::open(env.cache_dir())?.list().await?.is_empty());

    robustus(env.path(), &repos)
        .args(["cache", "remove", "numpy==1.7.2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not cached"));
    Ok(())
}

#[test]
fn test_init_requires_pip_and_writes_settings() -> Result<()> {
    let dir = TempDir::new()?;
    let repos = TempDir::new()?;

    robustus(dir.path(), &repos).arg("init").assert().failure().stderr(predicate::str::contains("pip not found"));

    std::fs::create_dir_all(dir.path().join("bin"))?;
    std::fs::write(dir.path().join("bin/pip"), "")?;
    robustus(dir.path(), &repos).arg("init").assert().success();
    let written = std::fs::read_to_string(dir.path().join(".robustus"))?;
    assert!(written.contains("wheelhouse"));

    robustus(dir.path(), &repos).arg("init").assert().failure().stderr(predicate::str::contains("--force"));
    Ok(())
}

#[tokio::test]
async fn test_cache_clean_skips_records_being_built() -> Result<()> {
    let env = TestEnv::new()?;
    let repos = TempDir::new()?;
    let index = CacheIndex::open(env.cache_dir())?;
    let building = Fingerprint::of(&Requirement::named("numpy", Some("1.7.2")));
    let abandoned = Fingerprint::of(&Requirement::named("scipy", Some("0.13.0")));
    index.begin(&building).await?;
    index.begin(&abandoned).await?;

    let _held = CacheLock::acquire(index.dir(), building.as_str(), Duration::from_secs(10)).await?;
    robustus(env.path(), &repos)
        .args(["cache", "clean"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 incomplete record(s)"));

    assert!(index.record_path(&building).exists());
    assert!(!index.record_path(&abandoned).exists());
    Ok(())
}
