//! In-memory snapshot of a star graph.
//!
//! Loaded from a JSON file, a snapshot replays a frozen view of the source for
//! offline and reproducible runs:
//!
//! ```json
//! {
//!   "repos":    { "a/b": { "total_stars": 10, "total_forks": 2 } },
//!   "starred":  { "octocat": ["a/b", "c/d"] },
//!   "activity": { "octocat": [{ "repo": "c/d", "kind": "fork" }] }
//! }
//! ```
//!
//! Stargazer lists are derived from `starred`, ordered by login.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FetchResult, Page, PageRequest, Resource, StarSource};
use crate::error::{Error, FetchError, Result};
use crate::model::{Activity, EventKind, RepoId, RepoMetadata, RepoRef, StargazerRef};

/// One recorded activity item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEvent {
    /// Target repository.
    pub repo: RepoId,
    /// Kind of activity.
    #[serde(default = "default_kind")]
    pub kind: EventKind,
    /// Timestamp.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

const fn default_kind() -> EventKind {
    EventKind::Watch
}

/// Frozen star graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    /// Repository metadata.
    #[serde(default)]
    pub repos: BTreeMap<RepoId, RepoMetadata>,
    /// Repositories starred by each user, most recent first.
    #[serde(default)]
    pub starred: BTreeMap<String, Vec<RepoId>>,
    /// Optional event-log activity per user; falls back to `starred`.
    #[serde(default)]
    pub activity: BTreeMap<String, Vec<SnapshotEvent>>,
}

impl Snapshot {
    /// Load a snapshot from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid snapshot.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Add repository metadata.
    #[must_use]
    pub fn with_repo(mut self, repo: &str, total_stars: u64, total_forks: u64) -> Self {
        self.repos.insert(
            RepoId::new(repo),
            RepoMetadata {
                total_stars,
                total_forks,
                fork: false,
            },
        );
        self
    }

    /// Record the repositories a user starred.
    #[must_use]
    pub fn with_stars<I, S>(mut self, login: &str, repos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.starred
            .entry(login.to_string())
            .or_default()
            .extend(repos.into_iter().map(RepoId::new));
        self
    }

    /// Record event-log activity of a user.
    #[must_use]
    pub fn with_activity(mut self, login: &str, events: Vec<SnapshotEvent>) -> Self {
        self.activity
            .entry(login.to_string())
            .or_default()
            .extend(events);
        self
    }
}

/// [`StarSource`] serving a [`Snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    snapshot: Snapshot,
    stargazers: BTreeMap<RepoId, Vec<StargazerRef>>,
    page_size: usize,
}

impl SnapshotSource {
    /// Serve `snapshot` in pages of at most `page_size` items.
    #[must_use]
    pub fn new(snapshot: Snapshot, page_size: usize) -> Self {
        let mut inverse: BTreeMap<RepoId, BTreeSet<String>> = BTreeMap::new();
        for (login, repos) in &snapshot.starred {
            for repo in repos {
                inverse.entry(repo.clone()).or_default().insert(login.clone());
            }
        }
        let stargazers = inverse
            .into_iter()
            .map(|(repo, logins)| (repo, logins.into_iter().map(StargazerRef::new).collect()))
            .collect();

        Self {
            snapshot,
            stargazers,
            page_size: page_size.max(1),
        }
    }

    fn repo_ref(&self, id: &RepoId) -> RepoRef {
        RepoRef {
            id: id.clone(),
            metadata: self.snapshot.repos.get(id).copied(),
        }
    }

    fn is_known_repo(&self, repo: &RepoId) -> bool {
        self.snapshot.repos.contains_key(repo) || self.stargazers.contains_key(repo)
    }

    fn not_found(resource: &Resource) -> FetchError {
        FetchError::Client {
            resource: resource.to_string(),
            status: 404,
            message: "Not Found".to_string(),
        }
    }
}

/// Slice one page out of a full collection.
fn page_of<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    let start = page.cursor.offset(page.per_page).min(items.len());
    let end = (start + page.per_page).min(items.len());
    Page {
        items: items[start..end].to_vec(),
        next: (end < items.len()).then(|| page.cursor.next()),
    }
}

#[async_trait]
impl StarSource for SnapshotSource {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn max_page_size(&self) -> usize {
        self.page_size
    }

    async fn starred(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        let repos = self
            .snapshot
            .starred
            .get(login)
            .ok_or_else(|| Self::not_found(&Resource::Starred(login.to_string())))?;
        let items = repos
            .iter()
            .map(|id| Activity::star(self.repo_ref(id)))
            .collect::<Vec<_>>();
        Ok(page_of(&items, page))
    }

    async fn activity(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        let Some(events) = self.snapshot.activity.get(login) else {
            return self.starred(login, page).await;
        };
        let items = events
            .iter()
            .map(|event| Activity {
                repo: self.repo_ref(&event.repo),
                kind: event.kind,
                at: event.at,
            })
            .collect::<Vec<_>>();
        Ok(page_of(&items, page))
    }

    async fn stargazers(
        &self,
        repo: &RepoId,
        page: PageRequest,
    ) -> FetchResult<Page<StargazerRef>> {
        if !self.is_known_repo(repo) {
            return Err(Self::not_found(&Resource::Stargazers(repo.clone())));
        }
        let users = self.stargazers.get(repo).map_or(&[][..], Vec::as_slice);
        Ok(page_of(users, page))
    }

    async fn metadata(&self, repo: &RepoId) -> FetchResult<RepoMetadata> {
        self.snapshot
            .repos
            .get(repo)
            .copied()
            .ok_or_else(|| Self::not_found(&Resource::Metadata(repo.clone())))
    }
}
