//! # costar-core
//!
//! Core library for recommending GitHub repositories from stargazer
//! co-occurrence: repositories starred by the people who starred the same
//! repositories as you.
//!
//! ## Architecture
//!
//! A run flows through these modules:
//!
//! - [`source`] - data sources (GitHub REST API, ClickHouse event log, JSON snapshot)
//!   and the on-disk page cache
//! - [`governor`] - process-wide request pacing and retries
//! - [`fetch`] - lazy pagination
//! - [`traversal`] - seed → stargazer → neighbor expansion
//! - [`aggregate`] - per-(seed, candidate) overlap counting
//! - [`rank`] - scoring, sorting and truncation
//! - [`pipeline`] - the driver tying the stages together
//! - [`output`] - JSON artifacts
//! - [`config`] - configuration types and loading
//! - [`error`] - error types for the library
//!
//! ## Example
//!
//! ```rust,ignore
//! use costar_core::{RunConfig, run};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), costar_core::Error> {
//!     let config = RunConfig::load()?;
//!     let outcome = run(config, CancellationToken::new()).await?;
//!     println!("{}", outcome.written.latest.display());
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod governor;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod rank;
pub mod source;
pub mod traversal;

use std::sync::Arc;

pub use config::RunConfig;
pub use error::{Error, FetchError, Result};
use governor::{GovernedSource, Governor, RetryPolicy};
pub use model::{Recommendation, RecommendationSet, RepoId};
pub use output::{OutputWriter, WrittenPaths};
pub use pipeline::{Pipeline, PipelineSettings, RunReport};
use source::{
    CachedSource, ClickHouseSource, GitHubSource, Snapshot, SnapshotSource, StarSource,
};
use tokio_util::sync::CancellationToken;

use crate::config::SourceKind;

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// What the run computed.
    pub report: RunReport,
    /// Where the artifacts went.
    pub written: WrittenPaths,
}

/// Build the data source selected by `config`.
///
/// # Errors
///
/// Returns an error if the source configuration is invalid or a snapshot file
/// cannot be loaded.
pub fn connect(config: &RunConfig) -> Result<Arc<dyn StarSource>> {
    let source: Arc<dyn StarSource> = match config.source.kind {
        SourceKind::GitHub => Arc::new(GitHubSource::new(&config.github)?),
        SourceKind::ClickHouse => Arc::new(ClickHouseSource::new(&config.clickhouse)?),
        SourceKind::Snapshot => {
            let snapshot_config = config.snapshot.as_ref().ok_or_else(|| {
                Error::InvalidConfig("source.kind = \"snapshot\" requires [snapshot]".to_string())
            })?;
            let snapshot = Snapshot::load_from(&snapshot_config.path)?;
            Arc::new(SnapshotSource::new(snapshot, snapshot_config.page_size))
        }
    };
    Ok(source)
}

/// Run the whole pipeline for the configured user and write the artifacts.
///
/// Nothing is written unless the run completes; a failed or cancelled run
/// leaves earlier artifacts untouched.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a required fetch fails,
/// the run is cancelled, or the artifacts cannot be written.
pub async fn run(config: RunConfig, cancel: CancellationToken) -> Result<RunOutcome> {
    config.validate()?;
    let source = connect(&config)?;
    execute(source, &config, cancel).await
}

/// Run the pipeline against an already built source.
///
/// # Errors
///
/// See [`run`].
pub async fn execute<S: StarSource>(
    source: S,
    config: &RunConfig,
    cancel: CancellationToken,
) -> Result<RunOutcome> {
    let authenticated = source.is_authenticated();
    let governor = Arc::new(Governor::new(governor::request_delay(
        config.limits.request_delay_ms,
        authenticated,
    )));
    if !authenticated {
        tracing::warn!(
            delay_ms = u64::try_from(governor.delay().as_millis()).unwrap_or(u64::MAX),
            "No credential configured; requests are paced conservatively"
        );
    }

    let governed = GovernedSource::new(source, governor, RetryPolicy::from(&config.retry))
        .with_cancellation(cancel.clone());

    if config.cache.enabled {
        tracing::info!(
            directory = %config.cache.directory.display(),
            "Serving neighbor activity and stargazers from the on-disk cache"
        );
        let cached = CachedSource::new(governed, &config.cache.directory);
        complete(cached, config, &cancel).await
    } else {
        complete(governed, config, &cancel).await
    }
}

async fn complete<S: StarSource>(
    source: S,
    config: &RunConfig,
    cancel: &CancellationToken,
) -> Result<RunOutcome> {
    let pipeline = Pipeline::new(source, PipelineSettings::from_config(config));
    let report = pipeline.recommend(&config.user.login, cancel).await?;

    let written = OutputWriter::new(config.output.clone()).write(&report)?;
    Ok(RunOutcome { report, written })
}
