use std::path::PathBuf;

use costar_core::RunConfig;
use costar_core::config::SourceKind;
use costar_core::rank::ScoreNormalization;

use crate::common::fixture_path;

fn lookup(key: &str) -> Option<String> {
    (key == "COSTAR_TEST_LOGIN").then(|| "octocat".to_string())
}

#[test]
#[allow(clippy::expect_used)]
fn test_config_fixture_parses() {
    let content =
        std::fs::read_to_string(fixture_path("costar.toml")).expect("Failed to read config");
    let config = RunConfig::from_toml_str(&content, lookup).expect("Failed to parse config");

    assert_eq!(config.user.login, "octocat");
    assert_eq!(config.source.kind, SourceKind::Snapshot);
    let snapshot = config.snapshot.as_ref().expect("snapshot section");
    assert_eq!(snapshot.path, PathBuf::from("abc_snapshot.json"));
    assert_eq!(snapshot.page_size, 2);

    assert_eq!(config.limits.max_user_stars, Some(50));
    assert_eq!(config.limits.max_seed_repos, None);
    assert_eq!(config.limits.stargazers_per_repo, Some(25));
    assert_eq!(config.limits.min_cooccurrence, 2);
    assert_eq!(config.limits.top_n, Some(5));
    assert_eq!(config.limits.max_workers, 4);
    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.filters.min_repo_stars, Some(1));
    assert_eq!(config.ranking.normalization, ScoreNormalization::SeedSample);
    assert!(config.ranking.include_event_breakdown);
    assert!(!config.output.timestamp_suffix);
    assert_eq!(
        config.output.per_repo_directory,
        Some(PathBuf::from("out/repos"))
    );

    config.validate().expect("fixture config is valid");
}

#[test]
fn test_config_fixture_without_login_is_invalid() {
    let content = std::fs::read_to_string(fixture_path("costar.toml")).unwrap_or_default();
    let Ok(config) = RunConfig::from_toml_str(&content, |_| None) else {
        panic!("fixture should parse");
    };
    assert!(config.user.login.is_empty());
    assert!(config.validate().is_err());
}

#[test]
fn test_load_from_missing_file() {
    let result = RunConfig::load_from(&fixture_path("missing.toml"));
    assert!(matches!(
        result,
        Err(costar_core::Error::ConfigNotFound(_))
    ));
}

#[test]
#[allow(clippy::expect_used)]
fn test_example_config_parses() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../costar.example.toml");
    let content = std::fs::read_to_string(path).expect("Failed to read example config");
    let config = RunConfig::from_toml_str(&content, |key| match key {
        "COSTAR_USER" => Some("octocat".to_string()),
        "GITHUB_TOKEN" => Some("ghp_example".to_string()),
        _ => None,
    })
    .expect("Failed to parse example config");

    assert_eq!(config.user.login, "octocat");
    assert_eq!(config.source.kind, SourceKind::GitHub);
    assert_eq!(config.github.token.as_deref(), Some("ghp_example"));
    assert_eq!(config.limits.min_cooccurrence, 2);
    assert_eq!(config.filters.min_fork_stars, Some(50));
    config.validate().expect("example config is valid");
}
