//! Data sources.
//!
//! A [`StarSource`] answers the three questions the pipeline asks: which
//! repositories a user starred, who starred a repository, and how popular a
//! repository is. Implementations exist for the GitHub REST API, for a
//! ClickHouse event-log table, and for an in-memory snapshot.

mod cache;
mod clickhouse;
mod github;
mod snapshot;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cache::CachedSource;
pub use clickhouse::ClickHouseSource;
pub use github::GitHubSource;
pub use snapshot::{Snapshot, SnapshotSource};

use crate::error::FetchError;
use crate::model::{Activity, RepoId, RepoMetadata, StargazerRef};

/// Result of a single source call.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Page position, counted from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor(pub u32);

impl Cursor {
    /// The first page.
    pub const FIRST: Self = Self(1);

    /// The page after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Number of items preceding this page for a fixed page size.
    #[must_use]
    pub const fn offset(self, per_page: usize) -> usize {
        (self.0.saturating_sub(1) as usize) * per_page
    }
}

/// Request for one page of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Which page.
    pub cursor: Cursor,
    /// Requested page size.
    pub per_page: usize,
}

/// One page of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor of the following page, `None` when this is the last one.
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    /// A final page.
    #[must_use]
    pub const fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Descriptor of a fetchable resource, used for logs and errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Repositories starred by a user.
    Starred(String),
    /// Activity of a user (second hop).
    Activity(String),
    /// Stargazers of a repository.
    Stargazers(RepoId),
    /// Metadata of a repository.
    Metadata(RepoId),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starred(login) => write!(f, "starred repositories of {login}"),
            Self::Activity(login) => write!(f, "activity of {login}"),
            Self::Stargazers(repo) => write!(f, "stargazers of {repo}"),
            Self::Metadata(repo) => write!(f, "repository {repo}"),
        }
    }
}

/// Paginated access to the star graph.
#[async_trait]
pub trait StarSource: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Largest page size the source accepts.
    fn max_page_size(&self) -> usize {
        100
    }

    /// Whether the source is using a credential. Unauthenticated sources are
    /// paced more conservatively.
    fn is_authenticated(&self) -> bool {
        true
    }

    /// One page of the repositories starred by `login`.
    async fn starred(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>>;

    /// One page of `login`'s activity considered during neighbor expansion.
    ///
    /// Defaults to the starred list.
    async fn activity(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        self.starred(login, page).await
    }

    /// One page of the users who starred `repo`.
    async fn stargazers(&self, repo: &RepoId, page: PageRequest)
    -> FetchResult<Page<StargazerRef>>;

    /// Popularity numbers of `repo`.
    async fn metadata(&self, repo: &RepoId) -> FetchResult<RepoMetadata>;
}

#[async_trait]
impl<S: StarSource + ?Sized> StarSource for std::sync::Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn max_page_size(&self) -> usize {
        (**self).max_page_size()
    }

    fn is_authenticated(&self) -> bool {
        (**self).is_authenticated()
    }

    async fn starred(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        (**self).starred(login, page).await
    }

    async fn activity(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        (**self).activity(login, page).await
    }

    async fn stargazers(
        &self,
        repo: &RepoId,
        page: PageRequest,
    ) -> FetchResult<Page<StargazerRef>> {
        (**self).stargazers(repo, page).await
    }

    async fn metadata(&self, repo: &RepoId) -> FetchResult<RepoMetadata> {
        (**self).metadata(repo).await
    }
}

/// Classify an HTTP status that is not a success.
///
/// `rate_limited` tells whether the response carried rate-limit signals.
pub(crate) fn classify_status(
    resource: &Resource,
    status: u16,
    rate_limited: bool,
    retry_after: Option<std::time::Duration>,
    message: String,
) -> FetchError {
    if status == 429 || (status == 403 && rate_limited) {
        return FetchError::RateLimited {
            resource: resource.to_string(),
            retry_after,
        };
    }
    if status >= 500 || status == 408 {
        return FetchError::Transient {
            resource: resource.to_string(),
            message: format!("HTTP {status}: {message}"),
        };
    }
    FetchError::Client {
        resource: resource.to_string(),
        status,
        message,
    }
}

/// Classify a transport-level failure.
pub(crate) fn classify_transport(resource: &Resource, error: &reqwest::Error) -> FetchError {
    if let Some(status) = error.status() {
        return classify_status(resource, status.as_u16(), false, None, error.to_string());
    }
    if error.is_decode() {
        return FetchError::Decode {
            resource: resource.to_string(),
            message: error.to_string(),
        };
    }
    FetchError::Transient {
        resource: resource.to_string(),
        message: error.to_string(),
    }
}
