//! Error types for costar-core.
//!
//! Two layers: [`FetchError`] classifies a single failed call against a data
//! source (and drives the retry decisions of the governor), while [`Error`] is
//! the canonical error type returned by the library's public operations.

use std::path::PathBuf;
use std::time::Duration;

/// Failure of a single call against a data source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network failure, timeout or server-side (5xx) error. Retried with backoff.
    #[error("transient failure fetching {resource}: {message}")]
    Transient {
        /// Resource that was being fetched.
        resource: String,
        /// Description of the failure.
        message: String,
    },

    /// The source signalled a rate limit. Retried after waiting for the reset.
    #[error("rate limited fetching {resource}")]
    RateLimited {
        /// Resource that was being fetched.
        resource: String,
        /// How long the source asked us to wait, if it said so.
        retry_after: Option<Duration>,
    },

    /// Non-retryable client error such as not-found or unauthorized.
    #[error("client error {status} fetching {resource}: {message}")]
    Client {
        /// Resource that was being fetched.
        resource: String,
        /// HTTP status code (or equivalent).
        status: u16,
        /// Description of the failure.
        message: String,
    },

    /// The response could not be decoded.
    #[error("malformed response for {resource}: {message}")]
    Decode {
        /// Resource that was being fetched.
        resource: String,
        /// Description of the decoding failure.
        message: String,
    },

    /// Retries were exhausted.
    #[error("giving up on {resource} after {attempts} attempts: {source}")]
    Exhausted {
        /// Resource that was being fetched.
        resource: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last underlying error.
        #[source]
        source: Box<FetchError>,
    },

    /// The call was abandoned because the run was cancelled.
    #[error("cancelled while fetching {resource}")]
    Cancelled {
        /// Resource that was being fetched.
        resource: String,
    },
}

impl FetchError {
    /// Whether the governor may retry the call that produced this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }

    /// Whether the error is a non-retryable client error.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Client { .. })
    }

    /// Resource the error refers to.
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::Transient { resource, .. }
            | Self::RateLimited { resource, .. }
            | Self::Client { resource, .. }
            | Self::Decode { resource, .. }
            | Self::Exhausted { resource, .. }
            | Self::Cancelled { resource } => resource,
        }
    }
}

/// The main error type for costar-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),

    /// A fetch failed outside of the seed/user distinction.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The analyzed user's starred repositories could not be fetched.
    #[error("failed to fetch starred repositories of {login}: {source}")]
    UserStarsFetch {
        /// Login of the analyzed user.
        login: String,
        /// Underlying fetch error.
        #[source]
        source: FetchError,
    },

    /// A seed repository's stargazers could not be fetched; the run is aborted.
    #[error("failed to fetch stargazers of seed {repo}: {source}")]
    SeedFetch {
        /// Seed repository.
        repo: String,
        /// Underlying fetch error.
        #[source]
        source: FetchError,
    },

    /// Writing an output artifact failed.
    #[error("failed to write {path:?}: {source}")]
    Output {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled before completion.
    #[error("run cancelled")]
    Cancelled,
}

/// A specialized Result type for costar-core operations.
pub type Result<T> = std::result::Result<T, Error>;
