//! Build-once guarantees of the installer.

use anyhow::Result;
use robustus::builder::BuilderRegistry;
use robustus::cache::{CacheIndex, CacheRecord, Fingerprint};
use robustus::core::RobustusError;
use robustus::installer::{FailurePolicy, Installer, Outcome};
use robustus::requirement::Requirement;
use robustus::test_utils::{RecordingBuilder, TestEnv, init_test_logging};
use std::sync::Arc;
use std::time::Duration;

async fn installer(env: &TestEnv, builder: &Arc<RecordingBuilder>) -> Result<Installer> {
    Installer::new(env.settings(), BuilderRegistry::new(builder.clone())).await
}

fn requirements(specifiers: &[&str]) -> Vec<Requirement> {
    specifiers.iter().map(|s| s.parse().unwrap()).collect()
}

#[tokio::test]
async fn test_cached_fingerprint_never_invokes_builder() -> Result<()> {
    init_test_logging(None);
    let env = TestEnv::new()?;
    let list = requirements(&["numpy==1.7.2", "scipy==0.13.0", "http://host/archive/pkg-1.0.tar.gz"]);

    let first = Arc::new(RecordingBuilder::new());
    let report = installer(&env, &first).await?.install_all(&list, FailurePolicy::Abort).await;
    assert!(report.is_success());
    assert_eq!(report.count(Outcome::Built), 3);
    assert_eq!(first.builds().len(), 3);

    let second = Arc::new(RecordingBuilder::new());
    let report = installer(&env, &second).await?.install_all(&list, FailurePolicy::Abort).await;
    assert_eq!(report.count(Outcome::Cached), 3);
    assert!(second.builds().is_empty());
    assert_eq!(second.cached_installs().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_source_location_record_is_listed_by_specifier() -> Result<()> {
    let env = TestEnv::new()?;
    let builder = Arc::new(RecordingBuilder::new());
    installer(&env, &builder)
        .await?
        .ensure_installed(&"http://host/archive/pkg-1.0.tar.gz".parse::<Requirement>()?)
        .await?;

    let entries = CacheIndex::open(env.cache_dir())?.list().await?;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].fingerprint.as_str().starts_with("url-"));
    assert_eq!(entries[0].requirement.freeze(), "http://host/archive/pkg-1.0.tar.gz");
    Ok(())
}

#[tokio::test]
async fn test_failed_build_deletes_record_and_next_run_rebuilds() -> Result<()> {
    let env = TestEnv::new()?;
    let failing = Arc::new(RecordingBuilder::new().failing_on("opencv==2.4.7"));
    let opencv = Requirement::named("opencv", Some("2.4.7"));

    let error = installer(&env, &failing).await?.ensure_installed(&opencv).await.unwrap_err();
    assert!(matches!(error, RobustusError::InstallError { .. }));
    assert_eq!(error.specifier(), Some("opencv==2.4.7"));
    assert!(!env.cache_dir().join("opencv__2_4_7.rob").exists());

    let working = Arc::new(RecordingBuilder::new());
    let outcome = installer(&env, &working).await?.ensure_installed(&opencv).await?;
    assert_eq!(outcome.outcome, Outcome::Built);
    assert_eq!(working.builds(), vec!["opencv==2.4.7"]);
    Ok(())
}

#[tokio::test]
async fn test_record_completed_by_another_process_is_a_hit() -> Result<()> {
    let env = TestEnv::new()?;
    let builder = Arc::new(RecordingBuilder::new());
    let mut installer = installer(&env, &builder).await?;
    assert!(installer.known_cached().is_empty());

    // Another process finishes numpy after our startup listing.
    let numpy = Requirement::named("numpy", Some("1.7.2"));
    let index = CacheIndex::open(env.cache_dir())?;
    index.write(&Fingerprint::of(&numpy), &CacheRecord::new(&numpy, "wheel", Vec::new())).await?;

    let outcome = installer.ensure_installed(&numpy).await?;
    assert_eq!(outcome.outcome, Outcome::Cached);
    assert!(builder.builds().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_installers_build_once() -> Result<()> {
    let env = TestEnv::new()?;
    let builder = Arc::new(RecordingBuilder::new());
    let mut a = installer(&env, &builder).await?.with_lock_timeout(Duration::from_secs(10));
    let mut b = installer(&env, &builder).await?.with_lock_timeout(Duration::from_secs(10));
    let scipy = Requirement::named("scipy", Some("0.13.0"));

    let (first, second) = tokio::join!(a.ensure_installed(&scipy), b.ensure_installed(&scipy));
    let mut outcomes = vec![first?.outcome, second?.outcome];
    outcomes.sort_by_key(|o| matches!(o, Outcome::Cached));
    assert_eq!(outcomes, vec![Outcome::Built, Outcome::Cached]);
    assert_eq!(builder.builds().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_keep_going_reports_every_failure() -> Result<()> {
    let env = TestEnv::new()?;
    let builder = Arc::new(RecordingBuilder::new().failing_on("broken==1").failing_on("worse==2"));
    let list = requirements(&["broken==1", "numpy==1.7.2", "worse==2"]);

    let report = installer(&env, &builder).await?.install_all(&list, FailurePolicy::KeepGoing).await;
    let failed: Vec<&str> = report.failures.iter().filter_map(RobustusError::specifier).collect();
    assert_eq!(failed, vec!["broken==1", "worse==2"]);
    assert_eq!(report.count(Outcome::Built), 1);

    let cached = CacheIndex::open(env.cache_dir())?.list().await?;
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].requirement.freeze(), "numpy==1.7.2");
    Ok(())
}

#[tokio::test]
async fn test_overlay_location_is_cached_and_listed_back() -> Result<()> {
    let env = TestEnv::new()?;
    let builder = Arc::new(RecordingBuilder::new());
    let overlay = "ros_overlay==https://github.com/ros/robot_model.git";

    let installation = installer(&env, &builder).await?.ensure_installed(&overlay.parse::<Requirement>()?).await?;
    assert_eq!(installation.outcome, Outcome::Built);
    assert_eq!(builder.builds(), vec![overlay]);

    let entries = CacheIndex::open(env.cache_dir())?.list().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].requirement.freeze(), overlay);

    let again = Arc::new(RecordingBuilder::new());
    let installation = installer(&env, &again).await?.ensure_installed(&overlay.parse::<Requirement>()?).await?;
    assert_eq!(installation.outcome, Outcome::Cached);
    assert!(again.builds().is_empty());
    Ok(())
}
