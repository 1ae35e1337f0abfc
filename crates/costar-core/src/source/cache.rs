//! On-disk cache of neighbor activity and seed stargazers.
//!
//! Pages are stored as JSON under `{directory}/{source}/users` and
//! `{directory}/{source}/stargazers`, keyed by login or repository, page
//! number and page size. The analyzed user's own stars and repository
//! metadata are always fetched. Failed fetches are never cached.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{FetchResult, Page, PageRequest, StarSource};
use crate::model::{Activity, RepoId, RepoMetadata, StargazerRef};
use crate::output;

/// A [`StarSource`] that serves activity and stargazer pages from disk when
/// it has them.
#[derive(Debug)]
pub struct CachedSource<S> {
    inner: S,
    root: PathBuf,
}

impl<S: StarSource> CachedSource<S> {
    /// Cache `inner` under `directory`, separated by source name.
    pub fn new(inner: S, directory: &Path) -> Self {
        let root = directory.join(inner.name());
        Self { inner, root }
    }

    fn user_path(&self, login: &str, page: PageRequest) -> PathBuf {
        self.root
            .join("users")
            .join(entry_name(&login_key(login), page))
    }

    fn stargazers_path(&self, repo: &RepoId, page: PageRequest) -> PathBuf {
        self.root
            .join("stargazers")
            .join(entry_name(&repo.file_stem(), page))
    }
}

fn entry_name(key: &str, page: PageRequest) -> String {
    format!("{key}.p{}.n{}.json", page.cursor.0, page.per_page)
}

/// Logins compare case-insensitively; anything outside `[a-z0-9_-]` is
/// replaced.
fn login_key(login: &str) -> String {
    login
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '-' | '_') => c,
            _ => '_',
        })
        .collect()
}

async fn load<T: DeserializeOwned>(path: &Path) -> Option<Page<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Cache entry unreadable");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(page) => {
            debug!(path = %path.display(), "Cache hit");
            Some(page)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Ignoring corrupt cache entry");
            None
        }
    }
}

async fn store<T: Serialize>(path: PathBuf, page: &Page<T>) {
    let bytes = match serde_json::to_vec(page) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Cache entry not encodable");
            return;
        }
    };
    let shown = path.display().to_string();
    let written = tokio::task::spawn_blocking(move || {
        if let Some(parent) = path.parent() {
            output::create_dir(parent)?;
        }
        output::write_atomic(&path, &bytes)
    })
    .await;
    match written {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(path = %shown, error = %err, "Cache write failed"),
        Err(err) => warn!(path = %shown, error = %err, "Cache write task failed"),
    }
}

#[async_trait]
impl<S: StarSource> StarSource for CachedSource<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn max_page_size(&self) -> usize {
        self.inner.max_page_size()
    }

    fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated()
    }

    async fn starred(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        self.inner.starred(login, page).await
    }

    async fn activity(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        let path = self.user_path(login, page);
        if let Some(hit) = load(&path).await {
            return Ok(hit);
        }
        let fetched = self.inner.activity(login, page).await?;
        store(path, &fetched).await;
        Ok(fetched)
    }

    async fn stargazers(
        &self,
        repo: &RepoId,
        page: PageRequest,
    ) -> FetchResult<Page<StargazerRef>> {
        let path = self.stargazers_path(repo, page);
        if let Some(hit) = load(&path).await {
            return Ok(hit);
        }
        let fetched = self.inner.stargazers(repo, page).await?;
        store(path, &fetched).await;
        Ok(fetched)
    }

    async fn metadata(&self, repo: &RepoId) -> FetchResult<RepoMetadata> {
        self.inner.metadata(repo).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;
    use crate::source::{Cursor, Snapshot, SnapshotSource};

    fn snapshot() -> Snapshot {
        Snapshot::default()
            .with_repo("o/a", 3, 0)
            .with_stars("me", ["o/a"])
            .with_stars("u1", ["o/a", "o/b"])
    }

    fn first(per_page: usize) -> PageRequest {
        PageRequest {
            cursor: Cursor::FIRST,
            per_page,
        }
    }

    #[rstest]
    #[case("octocat", "octocat")]
    #[case("OctoCat", "octocat")]
    #[case("a-b_c", "a-b_c")]
    #[case("../etc", "___etc")]
    fn test_login_key(#[case] login: &str, #[case] expected: &str) {
        assert_eq!(login_key(login), expected);
    }

    #[tokio::test]
    async fn test_pages_are_served_from_disk() {
        let tmp_dir = TempDir::new().unwrap();
        let warm = CachedSource::new(SnapshotSource::new(snapshot(), 10), tmp_dir.path());
        let activity = warm.activity("u1", first(10)).await.unwrap();
        let stargazers = warm.stargazers(&RepoId::new("o/a"), first(10)).await.unwrap();

        let root = tmp_dir.path().join("snapshot");
        assert!(root.join("users/u1.p1.n10.json").exists());
        assert!(root.join("stargazers/o__a.p1.n10.json").exists());

        // An empty snapshot knows neither the user nor the repository.
        let cold = CachedSource::new(SnapshotSource::new(Snapshot::default(), 10), tmp_dir.path());
        assert_eq!(cold.activity("U1", first(10)).await.unwrap(), activity);
        assert_eq!(
            cold.stargazers(&RepoId::new("o/a"), first(10)).await.unwrap(),
            stargazers
        );
        assert!(cold.starred("me", first(10)).await.is_err());
        assert!(cold.metadata(&RepoId::new("o/a")).await.is_err());
    }

    #[tokio::test]
    async fn test_page_size_is_part_of_the_key() {
        let tmp_dir = TempDir::new().unwrap();
        let source = CachedSource::new(SnapshotSource::new(snapshot(), 10), tmp_dir.path());
        let one = source.activity("u1", first(1)).await.unwrap();
        let two = source.activity("u1", first(2)).await.unwrap();
        assert_eq!(one.items.len(), 1);
        assert_eq!(one.next, Some(Cursor(2)));
        assert_eq!(two.items.len(), 2);
        assert_eq!(two.next, None);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let tmp_dir = TempDir::new().unwrap();
        let source = CachedSource::new(SnapshotSource::new(snapshot(), 10), tmp_dir.path());
        assert!(source.stargazers(&RepoId::new("o/gone"), first(10)).await.is_err());
        assert!(!tmp_dir.path().join("snapshot/stargazers").exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_refetched() {
        let tmp_dir = TempDir::new().unwrap();
        let users = tmp_dir.path().join("snapshot/users");
        fs::create_dir_all(&users).unwrap();
        fs::write(users.join("u1.p1.n10.json"), "{not json").unwrap();

        let source = CachedSource::new(SnapshotSource::new(snapshot(), 10), tmp_dir.path());
        let page = source.activity("u1", first(10)).await.unwrap();
        assert_eq!(page.items.len(), 2);

        let stored = fs::read_to_string(users.join("u1.p1.n10.json")).unwrap();
        assert!(stored.contains("o/b"));
    }
}
