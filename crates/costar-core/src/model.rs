//! Data model shared by every stage of the pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    /// Create a repository identifier.
    pub fn new(full_name: impl Into<String>) -> Self {
        Self(full_name.into())
    }

    /// The `owner/name` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A filesystem-safe rendering (`owner__name`).
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.0.replace('/', "__")
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Repository popularity numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepoMetadata {
    /// Number of stargazers.
    pub total_stars: u64,
    /// Number of forks.
    pub total_forks: u64,
    /// Whether the repository is itself a fork.
    #[serde(default)]
    pub fork: bool,
}

/// A repository together with whatever metadata came with it.
///
/// Metadata is replaced as a whole when refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Repository identifier.
    pub id: RepoId,
    /// Metadata, when the source delivered it alongside the reference.
    #[serde(default)]
    pub metadata: Option<RepoMetadata>,
}

impl RepoRef {
    /// A reference without metadata.
    pub fn bare(id: impl Into<RepoId>) -> Self {
        Self {
            id: id.into(),
            metadata: None,
        }
    }

    /// A reference carrying metadata.
    pub fn with_metadata(id: impl Into<RepoId>, metadata: RepoMetadata) -> Self {
        Self {
            id: id.into(),
            metadata: Some(metadata),
        }
    }
}

impl From<String> for RepoId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A user who starred a repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StargazerRef(String);

impl StargazerRef {
    /// Create a stargazer reference from a login.
    pub fn new(login: impl Into<String>) -> Self {
        Self(login.into())
    }

    /// The login.
    #[must_use]
    pub fn login(&self) -> &str {
        &self.0
    }

    /// Case-insensitive login comparison, as logins are on GitHub.
    #[must_use]
    pub fn is(&self, login: &str) -> bool {
        self.0.eq_ignore_ascii_case(login)
    }
}

impl fmt::Display for StargazerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of activity linking a user to a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Starred the repository.
    Watch,
    /// Forked the repository.
    Fork,
    /// Pushed commits.
    Push,
    /// Commented on an issue, commit or pull request.
    Comment,
    /// Opened or changed an issue.
    Issue,
    /// Opened or changed a pull request.
    PullRequest,
    /// Any other event type.
    Other,
}

impl EventKind {
    /// Map an event-log type name (e.g. `WatchEvent`) to a kind.
    #[must_use]
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            "WatchEvent" => Self::Watch,
            "ForkEvent" => Self::Fork,
            "PushEvent" => Self::Push,
            "IssueCommentEvent" | "CommitCommentEvent" | "PullRequestReviewCommentEvent" => {
                Self::Comment
            }
            "IssuesEvent" => Self::Issue,
            "PullRequestEvent" => Self::PullRequest,
            _ => Self::Other,
        }
    }

    /// Event-log type names belonging to this kind.
    #[must_use]
    pub const fn event_types(self) -> &'static [&'static str] {
        match self {
            Self::Watch => &["WatchEvent"],
            Self::Fork => &["ForkEvent"],
            Self::Push => &["PushEvent"],
            Self::Comment => &[
                "IssueCommentEvent",
                "CommitCommentEvent",
                "PullRequestReviewCommentEvent",
            ],
            Self::Issue => &["IssuesEvent"],
            Self::PullRequest => &["PullRequestEvent"],
            Self::Other => &[],
        }
    }
}

/// One item of a user's activity: a starred repository, or an event-log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Repository the activity targets.
    pub repo: RepoRef,
    /// Kind of activity.
    pub kind: EventKind,
    /// When it happened, if known.
    pub at: Option<DateTime<Utc>>,
}

impl Activity {
    /// A star without a timestamp.
    #[must_use]
    pub const fn star(repo: RepoRef) -> Self {
        Self {
            repo,
            kind: EventKind::Watch,
            at: None,
        }
    }
}

/// "User `user`, who starred `seed`, also has `kind` activity on `candidate`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoOccurrenceEvent {
    /// Seed repository.
    pub seed: RepoId,
    /// Candidate repository.
    pub candidate: RepoId,
    /// Co-stargazer establishing the edge.
    pub user: StargazerRef,
    /// Kind of activity on the candidate.
    pub kind: EventKind,
    /// When the activity happened, if known.
    pub at: Option<DateTime<Utc>>,
}

/// Per-kind activity breakdown attached to a recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventBreakdown {
    /// Earliest observed event.
    pub first_event_date: Option<DateTime<Utc>>,
    /// Latest observed event.
    pub last_event_date: Option<DateTime<Utc>>,
    /// Push events.
    pub push_events: u64,
    /// Comment events.
    pub comment_events: u64,
    /// Issue events.
    pub issue_events: u64,
    /// Pull request events.
    pub pr_events: u64,
    /// Fork events.
    pub fork_events: u64,
    /// Watch (star) events.
    pub watch_events: u64,
    /// All events, including kinds without a dedicated counter.
    pub total_events: u64,
}

/// How the sampled neighbors engaged with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NeighborStats {
    /// Distinct neighbors who starred the candidate.
    pub stargazers: u64,
    /// Distinct neighbors who forked the candidate.
    pub forkers: u64,
    /// `stargazers / forkers` rounded to two decimals; `None` without forkers.
    pub ratio: Option<f64>,
}

impl NeighborStats {
    /// Stats from distinct starring and forking neighbor counts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(stargazers: u64, forkers: u64) -> Self {
        let ratio = (forkers > 0)
            .then(|| (stargazers as f64 / forkers as f64 * 100.0).round() / 100.0);
        Self {
            stargazers,
            forkers,
            ratio,
        }
    }
}

/// A single ranked recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Recommended repository.
    pub repo: RepoId,
    /// Number of distinct co-stargazers.
    pub count: u64,
    /// Stars of the recommended repository.
    pub total_stars: u64,
    /// Forks of the recommended repository.
    pub total_forks: u64,
    /// Ranking score.
    pub score: f64,
    /// Optional event breakdown, flattened into the object.
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<EventBreakdown>,
    /// Optional neighbor stats, flattened into the object.
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub neighbors: Option<NeighborStats>,
}

/// Seed repository to ranked recommendations.
pub type RecommendationSet = BTreeMap<RepoId, Vec<Recommendation>>;
