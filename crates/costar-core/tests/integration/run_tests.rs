use std::fs;
use std::sync::Arc;

use costar_core::error::FetchError;
use costar_core::model::RepoId;
use costar_core::source::{Snapshot, SnapshotSource};
use costar_core::{Error, execute, run};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::common::{FaultySource, abc_snapshot, fixture_path, init_tracing, snapshot_config};

fn repo(name: &str) -> RepoId {
    RepoId::new(name)
}

#[tokio::test]
async fn test_run_from_snapshot_file() {
    let tmp_dir = TempDir::new().unwrap();
    let out = tmp_dir.path().join("out");
    let config = snapshot_config(&fixture_path("abc_snapshot.json"), "me", &out);

    let outcome = run(config, CancellationToken::new()).await.unwrap();

    let recs = &outcome.report.recommendations[&repo("o/a")];
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].repo, repo("o/b"));
    assert_eq!(recs[0].count, 2);
    assert!((recs[0].score - 0.2).abs() < f64::EPSILON);
    assert_eq!(recs[1].repo, repo("o/c"));
    assert_eq!(recs[1].count, 1);
    assert!(recs[1].score.abs() < f64::EPSILON);

    let latest = fs::read_to_string(&outcome.written.latest).unwrap();
    let value: serde_json::Value = serde_json::from_str(&latest).unwrap();
    assert_eq!(value["o/a"][0]["repo"], "o/b");
    assert_eq!(value["o/a"][0]["total_stars"], 10);
    assert_eq!(value["o/a"][1]["repo"], "o/c");
    assert!(outcome.written.snapshot.exists());
}

#[tokio::test]
async fn test_min_cooccurrence_drops_single_overlap() {
    let tmp_dir = TempDir::new().unwrap();
    let mut config = snapshot_config(&fixture_path("abc_snapshot.json"), "me", tmp_dir.path());
    config.limits.min_cooccurrence = 2;

    let outcome = run(config, CancellationToken::new()).await.unwrap();

    let recs = &outcome.report.recommendations[&repo("o/a")];
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].repo, repo("o/b"));
}

#[tokio::test]
async fn test_event_breakdown_and_per_repo_files() {
    let tmp_dir = TempDir::new().unwrap();
    let mut config = snapshot_config(&fixture_path("abc_snapshot.json"), "me", tmp_dir.path());
    config.ranking.include_event_breakdown = true;
    config.output.per_repo_directory = Some(tmp_dir.path().join("repos"));

    let outcome = run(config, CancellationToken::new()).await.unwrap();

    let recs = &outcome.report.recommendations[&repo("o/a")];
    let fork = recs[1].breakdown.as_ref().unwrap();
    assert_eq!(fork.fork_events, 1);
    assert_eq!(fork.watch_events, 0);
    assert!(fork.last_event_date.is_some());

    assert_eq!(outcome.written.per_repo.len(), 1);
    let content = fs::read_to_string(tmp_dir.path().join("repos").join("o__a.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["repo"], "o/a");
    assert_eq!(value["recommendations"][1]["fork_events"], 1);
}

#[tokio::test]
async fn test_seed_failure_aborts_without_output() {
    init_tracing();
    let tmp_dir = TempDir::new().unwrap();
    let out = tmp_dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("latest.json"), "{\"previous\": []}").unwrap();

    let mut config = snapshot_config(&fixture_path("abc_snapshot.json"), "me", &out);
    config.retry.max_retries = 2;
    let source = Arc::new(FaultySource::new(abc_snapshot()).fail_stargazers("o/a"));

    let err = execute(Arc::clone(&source), &config, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::SeedFetch { repo, source } => {
            assert_eq!(repo, "o/a");
            assert!(matches!(source, FetchError::Exhausted { attempts: 3, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(source.calls("stargazers:o/a"), 3);
    assert_eq!(
        fs::read_to_string(out.join("latest.json")).unwrap(),
        "{\"previous\": []}"
    );
    assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
}

#[tokio::test]
async fn test_neighbor_failure_is_skipped() {
    init_tracing();
    let tmp_dir = TempDir::new().unwrap();
    let mut config = snapshot_config(&fixture_path("abc_snapshot.json"), "me", tmp_dir.path());
    config.retry.max_retries = 1;
    let source = Arc::new(FaultySource::new(abc_snapshot()).fail_activity("u2"));

    let outcome = execute(Arc::clone(&source), &config, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.report.traversal.skipped_neighbors, 1);
    assert_eq!(source.calls("activity:u2"), 2);
    let recs = &outcome.report.recommendations[&repo("o/a")];
    assert_eq!(recs[0].repo, repo("o/b"));
    assert_eq!(recs[0].count, 1);
}

#[tokio::test]
async fn test_shared_neighbor_expanded_once() {
    let snapshot = Snapshot::default()
        .with_repo("o/x", 5, 0)
        .with_stars("me", ["o/a", "o/b"])
        .with_stars("u1", ["o/a", "o/b", "o/x"])
        .with_stars("u2", ["o/a", "o/x"]);
    let tmp_dir = TempDir::new().unwrap();
    let config = snapshot_config(&fixture_path("abc_snapshot.json"), "me", tmp_dir.path());
    let source = Arc::new(FaultySource::new(snapshot));

    let outcome = execute(Arc::clone(&source), &config, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(source.calls("activity:u1"), 1);
    assert_eq!(source.calls("activity:me"), 0);
    let recommendations = &outcome.report.recommendations;
    assert_eq!(recommendations[&repo("o/a")][0].repo, repo("o/x"));
    assert_eq!(recommendations[&repo("o/a")][0].count, 2);
    assert!((recommendations[&repo("o/a")][0].score - 0.4).abs() < f64::EPSILON);
    assert_eq!(recommendations[&repo("o/b")][0].repo, repo("o/x"));
    assert_eq!(recommendations[&repo("o/b")][0].count, 1);
    // The user's own stars are never recommended.
    assert!(
        recommendations
            .values()
            .flatten()
            .all(|rec| rec.repo == repo("o/x"))
    );
}

#[tokio::test]
async fn test_top_n_and_ordering_bounds() {
    let mut snapshot = Snapshot::default().with_stars("me", ["o/seed"]);
    for j in 0..8_u64 {
        snapshot = snapshot.with_repo(&format!("c/{j}"), 100 + j * 10, j);
    }
    for i in 0..30_usize {
        let stars: Vec<String> = std::iter::once("o/seed".to_string())
            .chain((0..=i % 8).map(|j| format!("c/{j}")))
            .collect();
        snapshot = snapshot.with_stars(&format!("u{i:02}"), stars);
    }

    let tmp_dir = TempDir::new().unwrap();
    let mut config = snapshot_config(&fixture_path("abc_snapshot.json"), "me", tmp_dir.path());
    config.limits.top_n = Some(3);
    config.limits.min_cooccurrence = 2;
    config.limits.max_workers = 4;

    let outcome = execute(
        SnapshotSource::new(snapshot, 7),
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let recs = &outcome.report.recommendations[&repo("o/seed")];
    assert_eq!(recs.len(), 3);
    assert!(recs.iter().all(|rec| rec.count >= 2));
    assert!(recs.windows(2).all(|pair| pair[0].score >= pair[1].score));
    // c/0 is starred by every neighbor.
    assert_eq!(recs[0].repo, repo("c/0"));
    assert_eq!(recs[0].count, 30);
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing() {
    let tmp_dir = TempDir::new().unwrap();
    let out = tmp_dir.path().join("out");
    let config = snapshot_config(&fixture_path("abc_snapshot.json"), "me", &out);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run(config, cancel).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(!out.exists());
}

#[tokio::test]
async fn test_unknown_user_fails() {
    let tmp_dir = TempDir::new().unwrap();
    let config = snapshot_config(&fixture_path("abc_snapshot.json"), "ghost", tmp_dir.path());

    let err = run(config, CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        Error::UserStarsFetch {
            source: FetchError::Client { status: 404, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_cache_serves_second_run() {
    init_tracing();
    let tmp_dir = TempDir::new().unwrap();
    let mut config = snapshot_config(
        &fixture_path("abc_snapshot.json"),
        "me",
        &tmp_dir.path().join("out"),
    );
    config.cache.enabled = true;
    config.cache.directory = tmp_dir.path().join("cache");

    let first = Arc::new(FaultySource::new(abc_snapshot()));
    let warm = execute(Arc::clone(&first), &config, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.calls("activity:u1"), 1);
    assert!(tmp_dir.path().join("cache/faulty/users").is_dir());

    let second = Arc::new(FaultySource::new(abc_snapshot()));
    let cached = execute(Arc::clone(&second), &config, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.calls("starred:me"), 1);
    assert_eq!(second.calls("stargazers:o/a"), 0);
    for login in ["u1", "u2", "u3"] {
        assert_eq!(second.calls(&format!("activity:{login}")), 0, "{login}");
    }
    assert_eq!(cached.report.recommendations, warm.report.recommendations);
}

#[tokio::test]
async fn test_output_keeps_star_order_of_seeds() {
    let snapshot = Snapshot::default()
        .with_stars("me", ["o/z", "o/a"])
        .with_stars("u1", ["o/z", "o/a", "o/x"]);
    let tmp_dir = TempDir::new().unwrap();
    let config = snapshot_config(&fixture_path("abc_snapshot.json"), "me", tmp_dir.path());

    let outcome = execute(
        SnapshotSource::new(snapshot, 10),
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.report.seeds, vec![repo("o/z"), repo("o/a")]);
    let latest = fs::read_to_string(&outcome.written.latest).unwrap();
    let z = latest.find("\"o/z\"").unwrap();
    let a = latest.find("\"o/a\"").unwrap();
    assert!(z < a, "{latest}");
}
