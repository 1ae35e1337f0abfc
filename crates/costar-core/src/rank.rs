//! Scoring and ranking of accumulated candidates.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregate::{Accumulators, CandidateAccumulator};
use crate::config::{Limits, RankingConfig, RepoFilter};
use crate::error::{Error, FetchError, Result};
use crate::model::{
    NeighborStats, Recommendation, RecommendationSet, RepoId, RepoMetadata, RepoRef,
};
use crate::source::StarSource;

/// How an overlap count becomes a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// `count / total_stars` of the candidate; 0 for a candidate without stars.
    #[default]
    CandidateStars,
    /// `count / stargazers sampled for the seed`.
    SeedSample,
    /// The overlap count itself.
    RawCount,
}

impl ScoreNormalization {
    /// Score of a candidate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(self, count: u64, total_stars: u64, sample_size: usize) -> f64 {
        let denominator = match self {
            Self::CandidateStars => total_stars,
            Self::SeedSample => sample_size as u64,
            Self::RawCount => return count as f64,
        };
        if denominator == 0 {
            0.0
        } else {
            count as f64 / denominator as f64
        }
    }
}

/// Sort key of a seed's recommendation list.
///
/// Every key falls back to score, then count (both descending), then
/// repository name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    /// Score, descending.
    #[default]
    Score,
    /// Distinct starring neighbors, descending.
    Stargazers,
    /// Distinct forking neighbors, descending.
    Forkers,
    /// Stargazers/forkers ratio, descending; candidates without forkers last.
    Ratio,
}

impl RankOrder {
    fn compare(self, a: &NeighborStats, b: &NeighborStats) -> Ordering {
        match self {
            Self::Score => Ordering::Equal,
            Self::Stargazers => b.stargazers.cmp(&a.stargazers),
            Self::Forkers => b.forkers.cmp(&a.forkers),
            Self::Ratio => match (a.ratio, b.ratio) {
                (Some(a), Some(b)) => b.total_cmp(&a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
    }
}

/// Ranking parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankOptions {
    /// Minimum overlap count.
    pub min_cooccurrence: u64,
    /// Recommendations kept per seed.
    pub top_n: Option<usize>,
    /// Score normalization.
    pub normalization: ScoreNormalization,
    /// Sort key.
    pub order_by: RankOrder,
    /// Repository quality filter, checked against final metadata.
    pub filter: RepoFilter,
    /// Minimum distinct starring neighbors.
    pub min_stargazers: Option<u64>,
    /// Minimum distinct forking neighbors.
    pub min_forkers: Option<u64>,
    /// Minimum stargazers/forkers ratio; candidates without forkers fail it.
    pub min_ratio: Option<f64>,
    /// Attach event breakdowns.
    pub include_breakdown: bool,
    /// Attach neighbor stats.
    pub include_neighbor_stats: bool,
}

impl RankOptions {
    /// Options from the configuration sections that drive ranking.
    #[must_use]
    pub const fn from_config(limits: &Limits, ranking: &RankingConfig, filter: RepoFilter) -> Self {
        Self {
            min_cooccurrence: limits.min_cooccurrence,
            top_n: limits.top_n,
            normalization: ranking.normalization,
            order_by: ranking.order_by,
            filter,
            min_stargazers: ranking.min_stargazers,
            min_forkers: ranking.min_forkers,
            min_ratio: ranking.min_ratio,
            include_breakdown: ranking.include_event_breakdown,
            include_neighbor_stats: ranking.include_neighbor_stats,
        }
    }

    /// Whether a pair passes the thresholds that need no repository metadata.
    fn admits(&self, pair: &CandidateAccumulator) -> bool {
        if pair.count() < self.min_cooccurrence {
            return false;
        }
        if self.min_stargazers.is_none() && self.min_forkers.is_none() && self.min_ratio.is_none() {
            return true;
        }
        let stats = pair.neighbor_stats();
        self.min_stargazers.is_none_or(|min| stats.stargazers >= min)
            && self.min_forkers.is_none_or(|min| stats.forkers >= min)
            && self
                .min_ratio
                .is_none_or(|min| stats.ratio.is_some_and(|ratio| ratio >= min))
    }
}

impl Default for RankOptions {
    fn default() -> Self {
        Self::from_config(
            &Limits::default(),
            &RankingConfig::default(),
            RepoFilter::default(),
        )
    }
}

/// Distinct candidates, over all seeds, that pass the metadata-free
/// thresholds of `options`.
#[must_use]
pub fn candidates_needing_metadata(
    accumulators: &Accumulators,
    options: &RankOptions,
) -> BTreeSet<RepoId> {
    accumulators
        .seeds()
        .flat_map(|(_, seed)| seed.candidates())
        .filter(|(_, pair)| options.admits(pair))
        .map(|(repo, _)| repo.clone())
        .collect()
}

/// Repository metadata shared by every seed of a run.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    entries: HashMap<RepoId, RepoMetadata>,
    failed: BTreeSet<RepoId>,
    fetched: usize,
}

impl MetadataCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep metadata that arrived with a reference, unless some is cached already.
    pub fn offer(&mut self, repo: &RepoRef) {
        if let Some(metadata) = repo.metadata {
            self.entries.entry(repo.id.clone()).or_insert(metadata);
        }
    }

    /// Store metadata, replacing what was cached.
    pub fn insert(&mut self, repo: RepoId, metadata: RepoMetadata) {
        self.entries.insert(repo, metadata);
    }

    /// Cached metadata of `repo`.
    #[must_use]
    pub fn get(&self, repo: &RepoId) -> Option<RepoMetadata> {
        self.entries.get(repo).copied()
    }

    /// Number of cached repositories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Metadata lookups issued by [`MetadataCache::fill`].
    #[must_use]
    pub const fn fetched(&self) -> usize {
        self.fetched
    }

    /// Repositories whose metadata could not be fetched.
    #[must_use]
    pub const fn failed(&self) -> &BTreeSet<RepoId> {
        &self.failed
    }

    /// Fetch metadata for every repository in `repos` that is not cached yet,
    /// with at most `workers` lookups in flight.
    ///
    /// Failed lookups are logged and remembered; their candidates are dropped
    /// when ranking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when `cancel` fires.
    pub async fn fill<S, I>(
        &mut self,
        source: &S,
        repos: I,
        workers: usize,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        S: StarSource + ?Sized,
        I: IntoIterator<Item = RepoId>,
    {
        let missing: Vec<RepoId> = repos
            .into_iter()
            .filter(|repo| !self.entries.contains_key(repo))
            .collect();
        debug!(missing = missing.len(), cached = self.entries.len(), "Fetching metadata");
        self.fetched += missing.len();

        let lookups = stream::iter(missing)
            .map(move |repo| async move {
                let result = source.metadata(&repo).await;
                (repo, result)
            })
            .buffer_unordered(workers.max(1));
        let mut lookups = std::pin::pin!(lookups);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                next = lookups.next() => next,
            };
            match next {
                None => return Ok(()),
                Some((repo, Ok(metadata))) => {
                    self.entries.insert(repo, metadata);
                }
                Some((_, Err(FetchError::Cancelled { .. }))) => return Err(Error::Cancelled),
                Some((repo, Err(err))) => {
                    warn!(%repo, error = %err, "Dropping candidate without metadata");
                    self.failed.insert(repo);
                }
            }
        }
    }
}

fn compare(order: RankOrder, a: &Ranked, b: &Ranked) -> Ordering {
    order
        .compare(&a.stats, &b.stats)
        .then_with(|| b.recommendation.score.total_cmp(&a.recommendation.score))
        .then_with(|| b.recommendation.count.cmp(&a.recommendation.count))
        .then_with(|| a.recommendation.repo.cmp(&b.recommendation.repo))
}

struct Ranked {
    recommendation: Recommendation,
    stats: NeighborStats,
}

fn recommend(
    repo: &RepoId,
    pair: &CandidateAccumulator,
    metadata: RepoMetadata,
    sample_size: usize,
    options: &RankOptions,
) -> Ranked {
    let count = pair.count();
    let stats = pair.neighbor_stats();
    Ranked {
        recommendation: Recommendation {
            repo: repo.clone(),
            count,
            total_stars: metadata.total_stars,
            total_forks: metadata.total_forks,
            score: options
                .normalization
                .score(count, metadata.total_stars, sample_size),
            breakdown: options.include_breakdown.then(|| pair.breakdown()),
            neighbors: options.include_neighbor_stats.then_some(stats),
        },
        stats,
    }
}

/// Rank every seed's candidates.
///
/// Pairs below the thresholds of `options`, candidates without metadata and
/// candidates whose metadata fails the repository filter are dropped. Each
/// list is sorted by `order_by` and truncated to `top_n`. Every seed appears
/// in the result, possibly with an empty list.
#[must_use]
pub fn rank(
    accumulators: &Accumulators,
    metadata: &MetadataCache,
    options: &RankOptions,
) -> RecommendationSet {
    let mut set = RecommendationSet::new();
    for (seed, seed_acc) in accumulators.seeds() {
        let mut filtered = 0_usize;
        let mut ranked: Vec<Ranked> = seed_acc
            .candidates()
            .iter()
            .filter(|(_, pair)| options.admits(pair))
            .filter_map(|(repo, pair)| {
                let meta = metadata.get(repo)?;
                if !options.filter.accepts_metadata(&meta) {
                    filtered += 1;
                    return None;
                }
                Some(recommend(repo, pair, meta, seed_acc.sample_size(), options))
            })
            .collect();
        if filtered > 0 {
            debug!(%seed, filtered, "Dropped candidates failing the repository filter");
        }
        ranked.sort_by(|a, b| compare(options.order_by, a, b));
        if let Some(top_n) = options.top_n {
            ranked.truncate(top_n);
        }
        set.insert(
            seed.clone(),
            ranked.into_iter().map(|r| r.recommendation).collect(),
        );
    }
    set
}
