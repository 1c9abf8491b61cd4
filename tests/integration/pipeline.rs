//! Requirement files through expansion and deduplication.

use anyhow::Result;
use robustus::core::RobustusError;
use robustus::requirement::Requirement;
use robustus::resolver::{ResolutionContext, dedup};
use robustus::test_utils::{FakeFetcher, init_test_logging};
use std::sync::Arc;
use tempfile::TempDir;

const APP: &str = "-e git+https://github.com/company/app@master#egg=app";
const LIB: &str = "-e git+https://github.com/company/lib@v2#egg=lib";
const TOOLS: &str = "-e git+https://github.com/company/tools@master#egg=tools";

fn frozen(items: &[Requirement]) -> Vec<String> {
    items.iter().map(Requirement::freeze).collect()
}

fn position(items: &[String], specifier: &str) -> usize {
    items.iter().position(|s| s == specifier).unwrap_or_else(|| panic!("{specifier} missing from {items:?}"))
}

/// `app -> lib, tools`, `tools -> lib`, with lib pinning numpy.
fn fetcher() -> FakeFetcher {
    FakeFetcher::new()
        .with_file("https://github.com/company/app", Some("master"), &[LIB, TOOLS, "scipy==0.13.0"])
        .with_file("https://github.com/company/lib", Some("v2"), &["numpy==1.7.2", "# pinned for lib"])
        .with_file("https://github.com/company/tools", Some("master"), &[LIB, "numpy==1.7.1"])
}

#[tokio::test]
async fn test_file_with_editable_expands_dependencies_first() -> Result<()> {
    init_test_logging(None);
    let temp = TempDir::new()?;
    let file = temp.path().join("requirements.txt");
    std::fs::write(&file, format!("# project\nnose==1.3.0\n{APP}\n"))?;

    let fetcher = Arc::new(fetcher());
    let mut context = ResolutionContext::new(fetcher.clone());
    let items = frozen(&context.expand_file(&file).await?);

    assert_eq!(items.last().map(String::as_str), Some(APP));
    assert!(position(&items, "numpy==1.7.2") < position(&items, LIB));
    assert!(position(&items, LIB) < position(&items, TOOLS));
    assert!(position(&items, TOOLS) < position(&items, APP));
    assert_eq!(items.iter().filter(|s| s.as_str() == LIB).count(), 1);
    assert_eq!(fetcher.call_count("https://github.com/company/lib"), 1);
    Ok(())
}

#[tokio::test]
async fn test_later_pins_win_after_dedup() -> Result<()> {
    let mut context = ResolutionContext::new(Arc::new(fetcher()));
    let expanded = context.expand(APP.parse::<Requirement>()?).await?;
    let list = frozen(&dedup(expanded.clone(), &[]));

    // tools' numpy==1.7.1 comes after lib's numpy==1.7.2.
    assert!(list.contains(&"numpy==1.7.1".to_string()));
    assert!(!list.contains(&"numpy==1.7.2".to_string()));
    assert_eq!(list.last().map(String::as_str), Some(APP));
    assert_eq!(dedup(dedup(expanded.clone(), &[]), &[]), dedup(expanded, &[]));
    Ok(())
}

#[tokio::test]
async fn test_one_context_spans_command_line_and_files() -> Result<()> {
    let temp = TempDir::new()?;
    let file = temp.path().join("requirements.txt");
    std::fs::write(&file, format!("{LIB}\n"))?;

    let fetcher = Arc::new(fetcher());
    let mut context = ResolutionContext::new(fetcher.clone());
    let mut items = context.expand_all(&[LIB]).await?;
    items.extend(context.expand_file(&file).await?);

    // The second mention of lib is already visited and contributes nothing.
    assert_eq!(frozen(&items), vec!["numpy==1.7.2", LIB]);
    assert_eq!(fetcher.call_count("https://github.com/company/lib"), 1);
    Ok(())
}

#[tokio::test]
async fn test_overlay_locations_stay_distinct() -> Result<()> {
    let mut context = ResolutionContext::new(Arc::new(FakeFetcher::new()));
    let items = context
        .expand_all(&[
            "ros_overlay==https://github.com/ros/robot_model.git",
            "ros_overlay==https://github.com/ros/geometry.git",
            "numpy==1.7.2",
            "numpy==1.7.3",
        ])
        .await?;

    let overlays = vec!["ros_overlay".to_string()];
    assert_eq!(frozen(&dedup(items.clone(), &overlays)), vec![
        "ros_overlay==https://github.com/ros/robot_model.git",
        "ros_overlay==https://github.com/ros/geometry.git",
        "numpy==1.7.3",
    ]);
    assert_eq!(frozen(&dedup(items, &[])), vec![
        "ros_overlay==https://github.com/ros/geometry.git",
        "numpy==1.7.3",
    ]);
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_aborts_with_context() {
    let fetcher = FakeFetcher::new()
        .with_file("https://github.com/company/app", Some("master"), &[LIB])
        .failing_on("https://github.com/company/lib");
    let mut context = ResolutionContext::new(Arc::new(fetcher));

    let error = context.expand(APP.parse().unwrap()).await.unwrap_err();
    assert!(format!("{error:#}").contains("connection to https://github.com/company/lib refused"));
}

#[tokio::test]
async fn test_malformed_line_in_file_names_the_line() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("requirements.txt");
    std::fs::write(&file, "numpy==1.7.2\nscipy==\n").unwrap();

    let mut context = ResolutionContext::new(Arc::new(FakeFetcher::new()));
    let error = context.expand_file(&file).await.unwrap_err();
    assert!(error.chain().any(|cause| matches!(
        cause.downcast_ref::<RobustusError>(),
        Some(RobustusError::MalformedSpecifier { specifier }) if specifier == "scipy=="
    )));
}
