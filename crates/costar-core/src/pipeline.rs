//! End-to-end recommendation run.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate::Aggregator;
use crate::config::RunConfig;
use crate::error::{Error, FetchError, Result};
use crate::fetch::{self, Fetcher};
use crate::model::{CoOccurrenceEvent, RecommendationSet, RepoId, RepoRef};
use crate::rank::{self, MetadataCache, RankOptions};
use crate::source::StarSource;
use crate::traversal::{EventSink, TraversalEngine, TraversalLimits, TraversalReport};

/// Knobs of a run, independent of the data source.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// How many of the user's stars to fetch.
    pub max_user_stars: Option<usize>,
    /// How many of them become seeds.
    pub max_seed_repos: Option<usize>,
    /// Traversal sampling limits.
    pub traversal: TraversalLimits,
    /// Ranking parameters, including the repository filter.
    pub rank: RankOptions,
}

impl PipelineSettings {
    /// Settings from a run configuration.
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_user_stars: config.limits.max_user_stars,
            max_seed_repos: config.limits.max_seed_repos,
            traversal: TraversalLimits::from(&config.limits),
            rank: RankOptions::from_config(&config.limits, &config.ranking, config.filters),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&RunConfig::default())
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Analyzed user.
    pub username: String,
    /// When ranking finished.
    pub generated_at: DateTime<Utc>,
    /// Seed repositories, in the order they were chosen.
    pub seeds: Vec<RepoId>,
    /// Traversal counters.
    pub traversal: TraversalReport,
    /// Metadata lookups issued.
    pub metadata_fetches: usize,
    /// Ranked recommendations per seed.
    pub recommendations: RecommendationSet,
}

/// Traversal output routed into the aggregator and the metadata cache.
struct RunSink<'a> {
    aggregator: &'a mut Aggregator,
    metadata: &'a mut MetadataCache,
}

impl EventSink for RunSink<'_> {
    fn seed(&mut self, seed: &RepoId, sample_size: usize) {
        self.aggregator.record_sample_size(seed, sample_size);
    }

    fn record(&mut self, event: CoOccurrenceEvent) {
        self.aggregator.record(event);
    }

    fn observe(&mut self, repo: &RepoRef) {
        self.metadata.offer(repo);
    }
}

/// Drives fetch, traversal, aggregation and ranking over one source.
#[derive(Debug)]
pub struct Pipeline<S> {
    source: S,
    settings: PipelineSettings,
}

impl<S: StarSource> Pipeline<S> {
    /// A pipeline over `source`.
    pub const fn new(source: S, settings: PipelineSettings) -> Self {
        Self { source, settings }
    }

    /// Compute recommendations for `login`.
    ///
    /// # Errors
    ///
    /// Fails when the user's stars or any seed's stargazers cannot be
    /// fetched, or when `cancel` fires. Nothing is returned for a failed run.
    pub async fn recommend(&self, login: &str, cancel: &CancellationToken) -> Result<RunReport> {
        info!(user = login, source = self.source.name(), "Fetching starred repositories");
        let stars = self.user_stars(login, cancel).await?;

        let known: HashSet<RepoId> = stars.iter().map(|repo| repo.id.clone()).collect();
        let filter = self.settings.rank.filter;
        let mut metadata = MetadataCache::new();
        let mut chosen = HashSet::new();
        let seeds: Vec<RepoId> = stars
            .into_iter()
            .filter(|repo| filter.accepts(repo) && chosen.insert(repo.id.clone()))
            .inspect(|repo| metadata.offer(repo))
            .map(|repo| repo.id)
            .take(self.settings.max_seed_repos.unwrap_or(usize::MAX))
            .collect();
        info!(stars = known.len(), seeds = seeds.len(), "Selected seed repositories");
        if seeds.is_empty() {
            warn!(user = login, "No seed repositories; output will be empty");
        }

        let mut aggregator = Aggregator::new();
        for seed in &seeds {
            aggregator.register_seed(seed);
        }

        let engine = TraversalEngine::new(&self.source, self.settings.traversal, filter);
        let traversal = {
            let mut sink = RunSink {
                aggregator: &mut aggregator,
                metadata: &mut metadata,
            };
            engine
                .expand(&seeds, &known, login, &mut sink, cancel)
                .await?
        };
        let accumulators = aggregator.finish();

        // Listings may come without metadata; the filter runs again at rank time.
        let candidates = rank::candidates_needing_metadata(&accumulators, &self.settings.rank);
        info!(candidates = candidates.len(), "Fetching candidate metadata");
        metadata
            .fill(
                &self.source,
                candidates,
                self.settings.traversal.max_workers,
                cancel,
            )
            .await?;

        let recommendations = rank::rank(&accumulators, &metadata, &self.settings.rank);
        let total: usize = recommendations.values().map(Vec::len).sum();
        info!(
            seeds = recommendations.len(),
            recommendations = total,
            "Ranking finished"
        );

        Ok(RunReport {
            username: login.to_string(),
            generated_at: Utc::now(),
            seeds,
            traversal,
            metadata_fetches: metadata.fetched(),
            recommendations,
        })
    }

    async fn user_stars(&self, login: &str, cancel: &CancellationToken) -> Result<Vec<RepoRef>> {
        let stars = fetch::collect(Fetcher::new(&self.source).starred(login, self.settings.max_user_stars));
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = stars => result,
        };
        match result {
            Ok(items) => Ok(items.into_iter().map(|item| item.repo).collect()),
            Err(FetchError::Cancelled { .. }) => Err(Error::Cancelled),
            Err(source) => Err(Error::UserStarsFetch {
                login: login.to_string(),
                source,
            }),
        }
    }
}
