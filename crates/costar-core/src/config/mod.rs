//! Configuration types and loading.
//!
//! Configuration lives in a TOML file. String values written as `${VAR}` are
//! resolved from the environment when the file is loaded, and a handful of
//! environment variables override file values directly (see
//! [`RunConfig::apply_env`]).

mod limits;

use std::path::{Path, PathBuf};

pub use limits::{Limits, RetrySettings};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{EventKind, RepoMetadata, RepoRef};
use crate::rank::{RankOrder, ScoreNormalization};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "COSTAR_CONFIG";
/// Environment variable overriding `user.login`.
pub const USER_ENV: &str = "COSTAR_USER";
/// Environment variable supplying a GitHub token when the file has none.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

const CONFIG_FILE_NAME: &str = "costar.toml";

/// Main configuration for a recommendation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// The user whose stars seed the run.
    #[serde(default)]
    pub user: UserConfig,

    /// Which data source to query.
    #[serde(default)]
    pub source: SourceConfig,

    /// GitHub REST API settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// ClickHouse event-log settings.
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,

    /// Snapshot file settings.
    #[serde(default)]
    pub snapshot: Option<SnapshotConfig>,

    /// Sampling and ranking limits.
    #[serde(default)]
    pub limits: Limits,

    /// Retry and backoff tuning.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Repository quality filters.
    #[serde(default)]
    pub filters: RepoFilter,

    /// Ranking options.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Output artifact settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// On-disk cache of neighbor activity and stargazer pages.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// The analyzed user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// GitHub login.
    #[serde(default)]
    pub login: String,
}

/// Kind of data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// GitHub REST API.
    #[default]
    GitHub,
    /// ClickHouse event-log table.
    ClickHouse,
    /// JSON snapshot file.
    Snapshot,
}

/// Source selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Which source to use.
    #[serde(default)]
    pub kind: SourceKind,
}

/// GitHub REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubConfig {
    /// Personal access token; runs unauthenticated (and slower) without one.
    #[serde(default)]
    pub token: Option<String>,

    /// API base URL.
    #[serde(default = "default_github_api")]
    pub api_base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_github_timeout")]
    pub timeout_seconds: u64,

    /// `User-Agent` header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base_url: default_github_api(),
            timeout_seconds: default_github_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

const fn default_github_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("costar/{}", env!("CARGO_PKG_VERSION"))
}

/// ClickHouse event-log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClickHouseConfig {
    /// HTTP endpoint.
    #[serde(default = "default_clickhouse_url")]
    pub url: String,

    /// Events table.
    #[serde(default = "default_clickhouse_table")]
    pub table: String,

    /// User name.
    #[serde(default = "default_clickhouse_user")]
    pub user: Option<String>,

    /// Password.
    #[serde(default)]
    pub password: Option<String>,

    /// Query timeout in seconds.
    #[serde(default = "default_clickhouse_timeout")]
    pub timeout_seconds: u64,

    /// Event kinds considered during neighbor expansion.
    #[serde(default = "default_neighbor_event_kinds")]
    pub neighbor_event_kinds: Vec<EventKind>,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            table: default_clickhouse_table(),
            user: default_clickhouse_user(),
            password: None,
            timeout_seconds: default_clickhouse_timeout(),
            neighbor_event_kinds: default_neighbor_event_kinds(),
        }
    }
}

fn default_clickhouse_url() -> String {
    "https://play.clickhouse.com".to_string()
}

fn default_clickhouse_table() -> String {
    "github_events".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_clickhouse_user() -> Option<String> {
    Some("explorer".to_string())
}

const fn default_clickhouse_timeout() -> u64 {
    60
}

fn default_neighbor_event_kinds() -> Vec<EventKind> {
    vec![EventKind::Watch, EventKind::Fork]
}

/// Snapshot file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Path of the JSON snapshot.
    pub path: PathBuf,

    /// Page size used when serving the snapshot.
    #[serde(default = "default_snapshot_page_size")]
    pub page_size: usize,
}

const fn default_snapshot_page_size() -> usize {
    100
}

/// Repository quality filters, applied wherever repository metadata is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoFilter {
    /// Drop repositories with fewer stars.
    #[serde(default)]
    pub min_repo_stars: Option<u64>,

    /// Drop forks with fewer stars.
    #[serde(default)]
    pub min_fork_stars: Option<u64>,
}

impl RepoFilter {
    /// Whether `repo` passes the filter. Repositories without metadata pass.
    #[must_use]
    pub fn accepts(&self, repo: &RepoRef) -> bool {
        repo.metadata
            .as_ref()
            .is_none_or(|meta| self.accepts_metadata(meta))
    }

    /// Whether a repository with `meta` passes the filter.
    #[must_use]
    pub fn accepts_metadata(&self, meta: &RepoMetadata) -> bool {
        if self.min_repo_stars.is_some_and(|min| meta.total_stars < min) {
            return false;
        }
        !(meta.fork && self.min_fork_stars.is_some_and(|min| meta.total_stars < min))
    }
}

/// Ranking options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankingConfig {
    /// How the overlap count is normalized into a score.
    #[serde(default)]
    pub normalization: ScoreNormalization,

    /// Sort key of each seed's list.
    #[serde(default)]
    pub order_by: RankOrder,

    /// Drop candidates starred by fewer sampled neighbors.
    #[serde(default)]
    pub min_stargazers: Option<u64>,

    /// Drop candidates forked by fewer sampled neighbors.
    #[serde(default)]
    pub min_forkers: Option<u64>,

    /// Drop candidates whose stargazers/forkers ratio is lower, or undefined.
    #[serde(default)]
    pub min_ratio: Option<f64>,

    /// Attach the per-event-kind breakdown to each recommendation.
    #[serde(default)]
    pub include_event_breakdown: bool,

    /// Attach neighbor `stargazers`, `forkers` and `ratio` to each recommendation.
    #[serde(default)]
    pub include_neighbor_stats: bool,
}

/// On-disk cache of neighbor activity and seed stargazer pages.
///
/// The analyzed user's own stars and repository metadata are always fetched
/// fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Read and write the cache.
    #[serde(default)]
    pub enabled: bool,

    /// Cache root; one subdirectory per source.
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_cache_directory(),
        }
    }
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from("data/cache")
}

/// Output artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory receiving the artifacts.
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// Base name of the per-run file (without extension).
    #[serde(default = "default_output_filename")]
    pub filename: String,

    /// Append `-YYYYmmdd-HHMMSS` to the per-run file name.
    #[serde(default = "default_true")]
    pub timestamp_suffix: bool,

    /// Name of the file always holding the latest successful run.
    #[serde(default = "default_latest_filename")]
    pub latest_filename: String,

    /// Also write one file per seed repository into this directory.
    #[serde(default)]
    pub per_repo_directory: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            filename: default_output_filename(),
            timestamp_suffix: true,
            latest_filename: default_latest_filename(),
            per_repo_directory: None,
        }
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("data/recommendations")
}

fn default_output_filename() -> String {
    "recommendations".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_latest_filename() -> String {
    "latest.json".to_string()
}

/// Resolve a `${VAR}` reference; `null`, `none` and empty strings mean "absent".
fn resolve_value<F>(value: Option<String>, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = value?;
    let value = match value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(var) => {
            let resolved = lookup(var);
            if resolved.is_none() {
                tracing::warn!(variable = var, "environment variable referenced in config is not set");
            }
            resolved?
        }
        None => value,
    };
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") || trimmed.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value)
    }
}

impl RunConfig {
    /// Load configuration from the default locations.
    ///
    /// Paths checked in order:
    /// 1. `$COSTAR_CONFIG` environment variable
    /// 2. `./costar.toml` (current directory)
    /// 3. `~/.config/costar/costar.toml` (platform config directory)
    ///
    /// If no configuration file exists, a default file is created in the
    /// user's config directory and defaults are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing an existing config fails.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Self::load_from(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("costar").join(CONFIG_FILE_NAME);
            if user_config.exists() {
                return Self::load_from(&user_config);
            }

            if let Err(e) = Self::create_default_config_file(&user_config) {
                tracing::warn!(
                    "Failed to create default config at {}: {}. Using in-memory defaults.",
                    user_config.display(),
                    e
                );
            } else {
                tracing::info!("Created default config at {}", user_config.display());
            }
        }

        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist or parsing fails.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        Self::from_toml_str(&content, |key| std::env::var(key).ok())
    }

    /// Parse configuration text, resolving environment references with `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml_str<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = toml::from_str(content)?;
        config.apply_env(lookup);
        Ok(config)
    }

    /// Resolve `${VAR}` values and apply environment overrides.
    ///
    /// `COSTAR_USER` replaces `user.login`; `GITHUB_TOKEN` is used when no
    /// GitHub token is configured.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.user.login =
            resolve_value(Some(std::mem::take(&mut self.user.login)), &lookup).unwrap_or_default();
        if let Some(login) = resolve_value(lookup(USER_ENV), &lookup) {
            self.user.login = login;
        }

        self.github.token = resolve_value(self.github.token.take(), &lookup)
            .or_else(|| resolve_value(lookup(TOKEN_ENV), &lookup));
        self.clickhouse.user = resolve_value(self.clickhouse.user.take(), &lookup);
        self.clickhouse.password = resolve_value(self.clickhouse.password.take(), &lookup);
    }

    /// Create a default configuration file.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if directory or file creation fails.
    fn create_default_config_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let default_config = Self::default();
        let toml_content = toml::to_string_pretty(&default_config)?;
        std::fs::write(path, toml_content)?;

        Ok(())
    }

    /// Validate the configuration before a run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.user.login.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "user.login is required (or set COSTAR_USER)".to_string(),
            ));
        }
        if self.limits.max_workers == 0 {
            return Err(Error::InvalidConfig(
                "limits.max_workers must be at least 1".to_string(),
            ));
        }
        if self.limits.min_cooccurrence == 0 {
            return Err(Error::InvalidConfig(
                "limits.min_cooccurrence must be at least 1".to_string(),
            ));
        }
        if self.limits.top_n == Some(0) {
            return Err(Error::InvalidConfig(
                "limits.top_n must be positive or \"unbounded\"".to_string(),
            ));
        }
        if self.ranking.min_ratio.is_some_and(|ratio| !ratio.is_finite() || ratio < 0.0) {
            return Err(Error::InvalidConfig(
                "ranking.min_ratio must be a non-negative number".to_string(),
            ));
        }
        if self.source.kind == SourceKind::Snapshot && self.snapshot.is_none() {
            return Err(Error::InvalidConfig(
                "source.kind = \"snapshot\" requires a [snapshot] section".to_string(),
            ));
        }
        if self.output.filename.trim().is_empty() || self.output.latest_filename.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "output.filename and output.latest_filename cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.source.kind, SourceKind::GitHub);
        assert_eq!(config.github.api_base_url, "https://api.github.com");
        assert_eq!(config.clickhouse.table, "github_events");
        assert_eq!(config.output.latest_filename, "latest.json");
        assert!(config.output.timestamp_suffix);
        assert_eq!(config.ranking.normalization, ScoreNormalization::CandidateStars);
        assert_eq!(config.ranking.order_by, RankOrder::Score);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
            [user]
            login = "octocat"

            [source]
            kind = "clickhouse"

            [clickhouse]
            table = "events"
            neighbor_event_kinds = ["watch", "fork", "push"]

            [limits]
            max_user_stars = "unbounded"
            stargazers_per_repo = 30
            min_cooccurrence = 2
            top_n = 5
            max_workers = 4

            [filters]
            min_repo_stars = 5
            min_fork_stars = 50

            [ranking]
            normalization = "seed_sample"
            order_by = "ratio"
            min_forkers = 2
            min_ratio = 1.5
            include_event_breakdown = true
            include_neighbor_stats = true

            [cache]
            enabled = true
            directory = "cache"

            [output]
            directory = "out"
            timestamp_suffix = false
        "#;

        let config = RunConfig::from_toml_str(toml_content, no_env).unwrap();
        assert_eq!(config.user.login, "octocat");
        assert_eq!(config.source.kind, SourceKind::ClickHouse);
        assert_eq!(config.clickhouse.neighbor_event_kinds.len(), 3);
        assert_eq!(config.limits.max_user_stars, None);
        assert_eq!(config.limits.stargazers_per_repo, Some(30));
        assert_eq!(config.limits.top_n, Some(5));
        assert_eq!(config.filters.min_fork_stars, Some(50));
        assert_eq!(config.ranking.normalization, ScoreNormalization::SeedSample);
        assert!(config.ranking.include_event_breakdown);
        assert_eq!(config.ranking.order_by, RankOrder::Ratio);
        assert_eq!(config.ranking.min_forkers, Some(2));
        assert_eq!(config.ranking.min_ratio, Some(1.5));
        assert!(config.ranking.include_neighbor_stats);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.directory, PathBuf::from("cache"));
        assert_eq!(config.output.directory, PathBuf::from("out"));
        config.validate().unwrap();
    }

    #[test]
    fn test_env_placeholders_are_resolved() {
        let toml_content = r#"
            [user]
            login = "${GH_USER}"

            [github]
            token = "${MY_TOKEN}"
        "#;
        let env = env_of(&[("GH_USER", "octocat"), ("MY_TOKEN", "ghp_abc")]);
        let config = RunConfig::from_toml_str(toml_content, env).unwrap();
        assert_eq!(config.user.login, "octocat");
        assert_eq!(config.github.token.as_deref(), Some("ghp_abc"));
    }

    #[test]
    fn test_unset_placeholder_becomes_absent() {
        let toml_content = r#"
            [github]
            token = "${MISSING}"
        "#;
        let config = RunConfig::from_toml_str(toml_content, no_env).unwrap();
        assert!(config.github.token.is_none());
    }

    #[test]
    fn test_null_strings_become_absent() {
        let toml_content = r#"
            [github]
            token = "null"
        "#;
        let config = RunConfig::from_toml_str(toml_content, no_env).unwrap();
        assert!(config.github.token.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let toml_content = r#"
            [user]
            login = "from-file"
        "#;
        let env = env_of(&[(USER_ENV, "from-env"), (TOKEN_ENV, "ghp_env")]);
        let config = RunConfig::from_toml_str(toml_content, env).unwrap();
        assert_eq!(config.user.login, "from-env");
        assert_eq!(config.github.token.as_deref(), Some("ghp_env"));
    }

    #[test]
    fn test_file_token_wins_over_env_token() {
        let toml_content = r#"
            [github]
            token = "ghp_file"
        "#;
        let env = env_of(&[(TOKEN_ENV, "ghp_env")]);
        let config = RunConfig::from_toml_str(toml_content, env).unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_file"));
    }

    #[rstest]
    #[case(None, false, true)]
    #[case(None, true, true)]
    #[case(Some((4, false)), false, true)]
    #[case(Some((4, false)), true, false)]
    #[case(Some((10, true)), true, false)]
    #[case(Some((60, true)), true, true)]
    fn test_repo_filter(
        #[case] meta: Option<(u64, bool)>,
        #[case] active: bool,
        #[case] accepted: bool,
    ) {
        use crate::model::RepoMetadata;

        let filter = if active {
            RepoFilter {
                min_repo_stars: Some(5),
                min_fork_stars: Some(50),
            }
        } else {
            RepoFilter::default()
        };
        let repo = match meta {
            Some((total_stars, fork)) => RepoRef::with_metadata(
                "a/b",
                RepoMetadata {
                    total_stars,
                    total_forks: 0,
                    fork,
                },
            ),
            None => RepoRef::bare("a/b"),
        };
        assert_eq!(filter.accepts(&repo), accepted);
        if let Some(meta) = repo.metadata {
            assert_eq!(filter.accepts_metadata(&meta), accepted);
        }
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let result = RunConfig::load_from(Path::new("/nonexistent/costar.toml"));
        if let Err(Error::ConfigNotFound(path)) = result {
            assert_eq!(path, PathBuf::from("/nonexistent/costar.toml"));
        } else {
            panic!("Expected ConfigNotFound error");
        }
    }

    #[test]
    fn test_load_from_invalid_toml() {
        let tmp_dir = TempDir::new().unwrap();
        let config_path = tmp_dir.path().join("invalid.toml");
        fs::write(&config_path, "invalid toml content {{}").unwrap();

        assert!(RunConfig::load_from(&config_path).is_err());
    }

    #[test]
    fn test_deny_unknown_fields() {
        let result = RunConfig::from_toml_str("unknown_field = 1", no_env);
        assert!(result.is_err(), "Should reject unknown fields");
    }

    #[test]
    fn test_empty_config_file() {
        let tmp_dir = TempDir::new().unwrap();
        let config_path = tmp_dir.path().join("empty.toml");
        fs::write(&config_path, "").unwrap();

        let config = RunConfig::load_from(&config_path).unwrap();
        assert_eq!(config.limits, Limits::default());
    }

    #[test]
    fn test_validate_requires_login() {
        let config = RunConfig::from_toml_str("", no_env).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("user.login")));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let toml_content = r#"
            [user]
            login = "octocat"
            [limits]
            max_workers = 0
        "#;
        let config = RunConfig::from_toml_str(toml_content, no_env).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("max_workers")));
    }

    #[rstest]
    #[case("-1.0")]
    #[case("nan")]
    fn test_validate_rejects_bad_min_ratio(#[case] ratio: &str) {
        let toml_content = format!(
            "[user]\nlogin = \"octocat\"\n[ranking]\nmin_ratio = {ratio}\n"
        );
        let config = RunConfig::from_toml_str(&toml_content, no_env).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("min_ratio")));
    }

    #[test]
    fn test_validate_snapshot_requires_section() {
        let toml_content = r#"
            [user]
            login = "octocat"
            [source]
            kind = "snapshot"
        "#;
        let config = RunConfig::from_toml_str(toml_content, no_env).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_create_default_config_file() {
        let tmp_dir = TempDir::new().unwrap();
        let config_path = tmp_dir.path().join("costar").join("costar.toml");

        RunConfig::create_default_config_file(&config_path).unwrap();
        assert!(config_path.exists());

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[limits]"));
        assert!(content.contains("[output]"));

        let loaded = RunConfig::from_toml_str(&content, no_env).unwrap();
        assert_eq!(loaded.limits, Limits::default());
    }
}
