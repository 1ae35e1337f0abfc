//! Shared helpers for costar-core integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use costar_core::RunConfig;
use costar_core::config::{OutputConfig, SnapshotConfig, SourceKind};
use costar_core::error::FetchError;
use costar_core::model::{Activity, RepoId, RepoMetadata, StargazerRef};
use costar_core::source::{FetchResult, Page, PageRequest, Snapshot, SnapshotSource, StarSource};

/// Route `tracing` output to the test harness; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Path of a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// `me` starred `o/a`; two of its other stargazers also starred `o/b`, one
/// starred `o/c`.
pub fn abc_snapshot() -> Snapshot {
    Snapshot::default()
        .with_repo("o/a", 3, 0)
        .with_repo("o/b", 10, 1)
        .with_repo("o/c", 0, 0)
        .with_stars("me", ["o/a"])
        .with_stars("u1", ["o/a", "o/b"])
        .with_stars("u2", ["o/a", "o/b"])
        .with_stars("u3", ["o/a", "o/c"])
}

/// A snapshot-backed configuration for `login` writing into `dir`.
pub fn snapshot_config(snapshot: &Path, login: &str, dir: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.user.login = login.to_string();
    config.source.kind = SourceKind::Snapshot;
    config.snapshot = Some(SnapshotConfig {
        path: snapshot.to_path_buf(),
        page_size: 100,
    });
    config.output = OutputConfig {
        directory: dir.to_path_buf(),
        ..OutputConfig::default()
    };
    config.retry.backoff_base_ms = 1;
    config.retry.max_backoff_ms = 5;
    config
}

/// Snapshot source that fails selected calls and counts every call it sees.
pub struct FaultySource {
    inner: SnapshotSource,
    failing_stargazers: HashSet<RepoId>,
    failing_activity: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FaultySource {
    /// Serve `snapshot` without failures until told otherwise.
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: SnapshotSource::new(snapshot, 100),
            failing_stargazers: HashSet::new(),
            failing_activity: HashSet::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Every stargazer page of `repo` fails transiently.
    pub fn fail_stargazers(mut self, repo: &str) -> Self {
        self.failing_stargazers.insert(RepoId::new(repo));
        self
    }

    /// Every activity page of `login` fails transiently.
    pub fn fail_activity(mut self, login: &str) -> Self {
        self.failing_activity.insert(login.to_string());
        self
    }

    /// How many calls were made for `key`, e.g. `"stargazers:o/a"`.
    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn count(&self, key: String) {
        *self.calls.lock().unwrap().entry(key).or_default() += 1;
    }
}

fn transient(resource: String) -> FetchError {
    FetchError::Transient {
        resource,
        message: "503 Service Unavailable".to_string(),
    }
}

#[async_trait]
impl StarSource for FaultySource {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn starred(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        self.count(format!("starred:{login}"));
        self.inner.starred(login, page).await
    }

    async fn activity(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        self.count(format!("activity:{login}"));
        if self.failing_activity.contains(login) {
            return Err(transient(format!("activity of {login}")));
        }
        self.inner.activity(login, page).await
    }

    async fn stargazers(
        &self,
        repo: &RepoId,
        page: PageRequest,
    ) -> FetchResult<Page<StargazerRef>> {
        self.count(format!("stargazers:{repo}"));
        if self.failing_stargazers.contains(repo) {
            return Err(transient(format!("stargazers of {repo}")));
        }
        self.inner.stargazers(repo, page).await
    }

    async fn metadata(&self, repo: &RepoId) -> FetchResult<RepoMetadata> {
        self.count(format!("metadata:{repo}"));
        self.inner.metadata(repo).await
    }
}
