//! Per-(seed, candidate) accumulation of co-occurrence events.
//!
//! The overlap count of a pair is the number of *distinct* users seen for it,
//! so every accumulator keeps the contributing logins, together with whether
//! each of them starred or forked the candidate. Event-kind counters, on the
//! other hand, grow with every event.
//!
//! The [`Aggregator`] is owned by whoever consumes traversal results; it is
//! never shared between tasks.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::model::{
    CoOccurrenceEvent, EventBreakdown, EventKind, NeighborStats, RepoId, StargazerRef,
};
use crate::traversal::EventSink;

/// Raw activity volume per event kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EventCounts {
    /// Watch (star) events.
    watch: u64,
    /// Fork events.
    fork: u64,
    /// Push events.
    push: u64,
    /// Comment events.
    comment: u64,
    /// Issue events.
    issue: u64,
    /// Pull request events.
    pull_request: u64,
    /// All events.
    total: u64,
}

impl EventCounts {
    fn add(&mut self, kind: EventKind) {
        match kind {
            EventKind::Watch => self.watch += 1,
            EventKind::Fork => self.fork += 1,
            EventKind::Push => self.push += 1,
            EventKind::Comment => self.comment += 1,
            EventKind::Issue => self.issue += 1,
            EventKind::PullRequest => self.pull_request += 1,
            EventKind::Other => {}
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Engagement {
    starred: bool,
    forked: bool,
}

/// Everything known about one (seed, candidate) pair.
#[derive(Debug, Clone, Default)]
pub struct CandidateAccumulator {
    users: HashMap<StargazerRef, Engagement>,
    kinds: EventCounts,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

impl CandidateAccumulator {
    /// Record one event; returns whether `user` is new for this pair.
    fn record(&mut self, user: StargazerRef, kind: EventKind, at: Option<DateTime<Utc>>) -> bool {
        self.kinds.add(kind);
        if let Some(at) = at {
            self.first_seen = Some(self.first_seen.map_or(at, |first| first.min(at)));
            self.last_seen = Some(self.last_seen.map_or(at, |last| last.max(at)));
        }
        let is_new = !self.users.contains_key(&user);
        let engagement = self.users.entry(user).or_default();
        match kind {
            EventKind::Watch => engagement.starred = true,
            EventKind::Fork => engagement.forked = true,
            _ => {}
        }
        is_new
    }

    /// Overlap count: distinct contributing users.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.users.len() as u64
    }

    /// Distinct contributing users who starred and who forked the candidate.
    #[must_use]
    pub fn neighbor_stats(&self) -> NeighborStats {
        let (stargazers, forkers) =
            self.users
                .values()
                .fold((0, 0), |(stars, forks), engagement| {
                    (
                        stars + u64::from(engagement.starred),
                        forks + u64::from(engagement.forked),
                    )
                });
        NeighborStats::new(stargazers, forkers)
    }

    /// The per-kind breakdown attached to recommendations.
    #[must_use]
    pub const fn breakdown(&self) -> EventBreakdown {
        EventBreakdown {
            first_event_date: self.first_seen,
            last_event_date: self.last_seen,
            push_events: self.kinds.push,
            comment_events: self.kinds.comment,
            issue_events: self.kinds.issue,
            pr_events: self.kinds.pull_request,
            fork_events: self.kinds.fork,
            watch_events: self.kinds.watch,
            total_events: self.kinds.total,
        }
    }
}

/// Candidates discovered for one seed.
#[derive(Debug, Clone, Default)]
pub struct SeedAccumulator {
    sample_size: usize,
    candidates: HashMap<RepoId, CandidateAccumulator>,
}

impl SeedAccumulator {
    /// Number of stargazers sampled for the seed.
    #[must_use]
    pub const fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Candidate accumulators by repository.
    #[must_use]
    pub const fn candidates(&self) -> &HashMap<RepoId, CandidateAccumulator> {
        &self.candidates
    }
}

/// Final accumulation state, ordered by seed.
#[derive(Debug, Clone, Default)]
pub struct Accumulators {
    seeds: BTreeMap<RepoId, SeedAccumulator>,
    events: u64,
}

impl Accumulators {
    /// Seeds in lexical order.
    pub fn seeds(&self) -> impl Iterator<Item = (&RepoId, &SeedAccumulator)> {
        self.seeds.iter()
    }

    /// Accumulator of one pair.
    #[must_use]
    pub fn get(&self, seed: &RepoId, candidate: &RepoId) -> Option<&CandidateAccumulator> {
        self.seeds.get(seed)?.candidates.get(candidate)
    }

    /// Overlap count of one pair (0 when never seen).
    #[must_use]
    pub fn count(&self, seed: &RepoId, candidate: &RepoId) -> u64 {
        self.get(seed, candidate)
            .map_or(0, CandidateAccumulator::count)
    }

    /// Number of events recorded.
    #[must_use]
    pub const fn events(&self) -> u64 {
        self.events
    }

    /// Number of seeds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// Whether no seed was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

/// Builds [`Accumulators`] from a stream of events.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Accumulators,
}

impl Aggregator {
    /// An empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `seed` shows up in the result even without candidates.
    pub fn register_seed(&mut self, seed: &RepoId) {
        self.state.seeds.entry(seed.clone()).or_default();
    }

    /// Remember how many stargazers were sampled for `seed`.
    pub fn record_sample_size(&mut self, seed: &RepoId, sample_size: usize) {
        self.state.seeds.entry(seed.clone()).or_default().sample_size = sample_size;
    }

    /// Record one event; returns whether it raised the pair's overlap count.
    pub fn record(&mut self, event: CoOccurrenceEvent) -> bool {
        self.state.events += 1;
        let seed = self.state.seeds.entry(event.seed).or_default();
        seed.candidates
            .entry(event.candidate)
            .or_default()
            .record(event.user, event.kind, event.at)
    }

    /// Finish accumulation.
    #[must_use]
    pub fn finish(self) -> Accumulators {
        self.state
    }
}

impl EventSink for Aggregator {
    fn seed(&mut self, seed: &RepoId, sample_size: usize) {
        self.record_sample_size(seed, sample_size);
    }

    fn record(&mut self, event: CoOccurrenceEvent) {
        Self::record(self, event);
    }
}

/// Accumulate a finite batch of events.
pub fn accumulate<I>(events: I) -> Accumulators
where
    I: IntoIterator<Item = CoOccurrenceEvent>,
{
    let mut aggregator = Aggregator::new();
    for event in events {
        aggregator.record(event);
    }
    aggregator.finish()
}
