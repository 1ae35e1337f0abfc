//! Traversal limits and retry tuning.

use serde::{Deserialize, Serialize};

/// Sampling and ranking limits.
///
/// `None` means "no limit"; in the TOML file this is written as the string
/// `"unbounded"` (`"none"` and `"null"` are accepted too).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    /// How many of the user's starred repositories to fetch.
    #[serde(
        default = "default_max_user_stars",
        alias = "recent_repos_limit",
        with = "bound"
    )]
    pub max_user_stars: Option<usize>,

    /// How many of those repositories to use as seeds.
    #[serde(default = "default_max_seed_repos", with = "bound")]
    pub max_seed_repos: Option<usize>,

    /// Stargazers sampled per seed repository.
    #[serde(default = "default_stargazers_per_repo", with = "bound")]
    pub stargazers_per_repo: Option<usize>,

    /// Items sampled per neighbor.
    #[serde(default = "default_stars_per_neighbor", with = "bound")]
    pub stars_per_neighbor: Option<usize>,

    /// Minimum number of distinct co-stargazers for a recommendation.
    #[serde(default = "default_min_cooccurrence")]
    pub min_cooccurrence: u64,

    /// Recommendations kept per seed.
    #[serde(default = "default_top_n", with = "bound")]
    pub top_n: Option<usize>,

    /// Concurrent neighbor fetches.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Minimum spacing between requests, raised when no credential is configured.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_user_stars: default_max_user_stars(),
            max_seed_repos: default_max_seed_repos(),
            stargazers_per_repo: default_stargazers_per_repo(),
            stars_per_neighbor: default_stars_per_neighbor(),
            min_cooccurrence: default_min_cooccurrence(),
            top_n: default_top_n(),
            max_workers: default_max_workers(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

#[allow(clippy::unnecessary_wraps)]
const fn default_max_user_stars() -> Option<usize> {
    Some(100)
}

#[allow(clippy::unnecessary_wraps)]
const fn default_max_seed_repos() -> Option<usize> {
    Some(10)
}

#[allow(clippy::unnecessary_wraps)]
const fn default_stargazers_per_repo() -> Option<usize> {
    Some(100)
}

#[allow(clippy::unnecessary_wraps)]
const fn default_stars_per_neighbor() -> Option<usize> {
    Some(100)
}

const fn default_min_cooccurrence() -> u64 {
    1
}

#[allow(clippy::unnecessary_wraps)]
const fn default_top_n() -> Option<usize> {
    Some(10)
}

const fn default_max_workers() -> usize {
    2
}

const fn default_request_delay_ms() -> u64 {
    0
}

/// Retry and backoff tuning for the governor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Retries after a transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit; the n-th retry waits n times this long.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling for a single backoff wait.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Rate-limit waits tolerated for a single call.
    #[serde(default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    /// Wait used when a rate-limit response carries no reset information.
    #[serde(default = "default_rate_limit_wait_secs")]
    pub default_rate_limit_wait_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_rate_limit_waits: default_max_rate_limit_waits(),
            default_rate_limit_wait_secs: default_rate_limit_wait_secs(),
        }
    }
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_backoff_base_ms() -> u64 {
    1500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_max_rate_limit_waits() -> u32 {
    3
}

const fn default_rate_limit_wait_secs() -> u64 {
    60
}

/// Serde adapter for optional limits: an integer, or `"unbounded"`.
pub(crate) mod bound {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    const UNBOUNDED: &str = "unbounded";

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<usize>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(n) => serializer.serialize_u64(*n as u64),
            None => serializer.serialize_str(UNBOUNDED),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<usize>, D::Error> {
        struct BoundVisitor;

        impl Visitor<'_> for BoundVisitor {
            type Value = Option<usize>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a non-negative integer or \"unbounded\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                usize::try_from(v).map(Some).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                usize::try_from(v)
                    .map(Some)
                    .map_err(|_| E::custom(format!("limit must not be negative, got {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                match v.trim().to_ascii_lowercase().as_str() {
                    "unbounded" | "none" | "null" | "" => Ok(None),
                    other => other
                        .parse()
                        .map(Some)
                        .map_err(|_| E::custom(format!("invalid limit '{v}'"))),
                }
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(None)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(None)
            }
        }

        deserializer.deserialize_any(BoundVisitor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_seed_repos, Some(10));
        assert_eq!(limits.top_n, Some(10));
        assert_eq!(limits.min_cooccurrence, 1);
        assert_eq!(limits.max_workers, 2);
    }

    #[rstest]
    #[case("stargazers_per_repo = 50", Some(50))]
    #[case("stargazers_per_repo = \"unbounded\"", None)]
    #[case("stargazers_per_repo = \"none\"", None)]
    #[case("stargazers_per_repo = \"null\"", None)]
    #[case("stargazers_per_repo = \"25\"", Some(25))]
    fn test_bound_values(#[case] toml_line: &str, #[case] expected: Option<usize>) {
        let limits: Limits = toml::from_str(toml_line).unwrap();
        assert_eq!(limits.stargazers_per_repo, expected);
    }

    #[test]
    fn test_negative_bound_is_rejected() {
        let result = toml::from_str::<Limits>("top_n = -1");
        assert!(result.is_err());
    }

    #[test]
    fn test_recent_repos_limit_alias() {
        let limits: Limits = toml::from_str("recent_repos_limit = 5").unwrap();
        assert_eq!(limits.max_user_stars, Some(5));
    }

    #[test]
    fn test_unbounded_serializes_as_string() {
        let limits = Limits {
            top_n: None,
            ..Limits::default()
        };
        let text = toml::to_string(&limits).unwrap();
        assert!(text.contains("top_n = \"unbounded\""));
        let back: Limits = toml::from_str(&text).unwrap();
        assert_eq!(back, limits);
    }

    #[test]
    fn test_default_retry_settings() {
        let retry = RetrySettings::default();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.backoff_base_ms, 1500);
    }
}
