//! Two-hop traversal from seed repositories to candidate repositories.
//!
//! Every seed's stargazers are sampled first. Each distinct stargazer (a
//! "neighbor") is then expanded exactly once, on a bounded pool of concurrent
//! fetches, and one [`CoOccurrenceEvent`] is emitted per (seed, item) for
//! every seed the neighbor was sampled under.

use std::collections::{BTreeMap, HashSet};

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Limits, RepoFilter};
use crate::error::{Error, FetchError, Result};
use crate::fetch::{self, Fetcher};
use crate::model::{Activity, CoOccurrenceEvent, RepoId, RepoRef, StargazerRef};
use crate::source::StarSource;

/// Receiver of traversal output.
pub trait EventSink {
    /// The stargazer sample of `seed` was fetched.
    fn seed(&mut self, _seed: &RepoId, _sample_size: usize) {}

    /// A co-occurrence was found.
    fn record(&mut self, event: CoOccurrenceEvent);

    /// A candidate repository was seen, possibly carrying metadata.
    fn observe(&mut self, _repo: &RepoRef) {}
}

impl EventSink for Vec<CoOccurrenceEvent> {
    fn record(&mut self, event: CoOccurrenceEvent) {
        self.push(event);
    }
}

/// Sampling limits of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    /// Stargazers sampled per seed.
    pub stargazers_per_repo: Option<usize>,
    /// Items fetched per neighbor.
    pub stars_per_neighbor: Option<usize>,
    /// Concurrent neighbor expansions.
    pub max_workers: usize,
}

impl From<&Limits> for TraversalLimits {
    fn from(limits: &Limits) -> Self {
        Self {
            stargazers_per_repo: limits.stargazers_per_repo,
            stars_per_neighbor: limits.stars_per_neighbor,
            max_workers: limits.max_workers,
        }
    }
}

/// What a traversal did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalReport {
    /// Seeds whose stargazers were fetched.
    pub seeds: usize,
    /// Distinct neighbors found.
    pub neighbors: usize,
    /// Neighbors successfully expanded.
    pub expanded: usize,
    /// Neighbors skipped after a fetch failure.
    pub skipped_neighbors: usize,
    /// Neighbor items dropped by the repository filter.
    pub filtered_items: usize,
    /// Events emitted.
    pub events: u64,
}

/// Expands seeds into co-occurrence events.
#[derive(Debug)]
pub struct TraversalEngine<'a, S: ?Sized> {
    source: &'a S,
    limits: TraversalLimits,
    filter: RepoFilter,
}

impl<'a, S: StarSource + ?Sized> TraversalEngine<'a, S> {
    /// Traverse `source` within `limits`, dropping items rejected by `filter`.
    #[must_use]
    pub const fn new(source: &'a S, limits: TraversalLimits, filter: RepoFilter) -> Self {
        Self {
            source,
            limits,
            filter,
        }
    }

    /// Expand `seeds` into events delivered to `sink`.
    ///
    /// Candidates contained in `known` (the analyzed user's own stars) and the
    /// seed itself are never emitted; `exclude_user` is removed from every
    /// stargazer sample.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SeedFetch`] when a seed's stargazers cannot be fetched,
    /// and [`Error::Cancelled`] when `cancel` fires. Neighbor failures are
    /// logged and skipped.
    pub async fn expand<K: EventSink>(
        &self,
        seeds: &[RepoId],
        known: &HashSet<RepoId>,
        exclude_user: &str,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<TraversalReport> {
        let fetcher = Fetcher::new(self.source);
        let mut report = TraversalReport::default();

        let mut neighbors: BTreeMap<StargazerRef, Vec<RepoId>> = BTreeMap::new();
        let mut visited = HashSet::new();
        for seed in seeds {
            if !visited.insert(seed) {
                continue;
            }
            // One extra stargazer makes up for the analyzed user.
            let cap = self.limits.stargazers_per_repo;
            let sample =
                fetch::collect(fetcher.stargazers(seed, cap.map(|cap| cap.saturating_add(1))));
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                result = sample => result,
            };
            let stargazers = result.map_err(|source| seed_failure(seed, source))?;

            let mut sampled = HashSet::new();
            for user in stargazers {
                if cap.is_some_and(|cap| sampled.len() >= cap) {
                    break;
                }
                if user.is(exclude_user) || !sampled.insert(user.clone()) {
                    continue;
                }
                neighbors.entry(user).or_default().push(seed.clone());
            }
            debug!(%seed, stargazers = sampled.len(), "Sampled seed stargazers");
            sink.seed(seed, sampled.len());
            report.seeds += 1;
        }

        report.neighbors = neighbors.len();
        info!(
            seeds = report.seeds,
            neighbors = report.neighbors,
            workers = self.limits.max_workers,
            "Expanding neighbors"
        );

        let cap = self.limits.stars_per_neighbor;
        let results = stream::iter(neighbors)
            .map(move |(user, seeds)| async move {
                let items = fetch::collect(fetcher.activity(user.login(), cap)).await;
                (user, seeds, items)
            })
            .buffer_unordered(self.limits.max_workers.max(1));
        let mut results = std::pin::pin!(results);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(expanded = report.expanded, "Traversal cancelled");
                    return Err(Error::Cancelled);
                }
                next = results.next() => next,
            };
            let Some((user, seeds, items)) = next else {
                break;
            };

            match items {
                Ok(items) => {
                    report.expanded += 1;
                    self.emit(&user, &seeds, items, known, sink, &mut report);
                }
                Err(FetchError::Cancelled { .. }) => return Err(Error::Cancelled),
                Err(err) => {
                    report.skipped_neighbors += 1;
                    warn!(%user, error = %err, "Skipping neighbor");
                }
            }
        }

        info!(
            expanded = report.expanded,
            skipped = report.skipped_neighbors,
            events = report.events,
            "Traversal finished"
        );
        Ok(report)
    }

    fn emit<K: EventSink>(
        &self,
        user: &StargazerRef,
        seeds: &[RepoId],
        items: Vec<Activity>,
        known: &HashSet<RepoId>,
        sink: &mut K,
        report: &mut TraversalReport,
    ) {
        for item in items {
            if !self.filter.accepts(&item.repo) {
                report.filtered_items += 1;
                continue;
            }
            if known.contains(&item.repo.id) {
                continue;
            }
            sink.observe(&item.repo);
            for seed in seeds.iter().filter(|seed| **seed != item.repo.id) {
                sink.record(CoOccurrenceEvent {
                    seed: seed.clone(),
                    candidate: item.repo.id.clone(),
                    user: user.clone(),
                    kind: item.kind,
                    at: item.at,
                });
                report.events += 1;
            }
        }
    }
}

fn seed_failure(seed: &RepoId, source: FetchError) -> Error {
    match source {
        FetchError::Cancelled { .. } => Error::Cancelled,
        source => Error::SeedFetch {
            repo: seed.to_string(),
            source,
        },
    }
}
