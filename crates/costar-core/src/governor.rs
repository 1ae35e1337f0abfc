//! Request pacing and retries.
//!
//! A single [`Governor`] is shared by every worker of a run. It hands out
//! request slots spaced by the configured delay and can be pushed back when
//! the source signals a rate limit, so all workers wait together.
//! [`GovernedSource`] wraps a [`StarSource`] and routes every call through the
//! governor, retrying transient failures and rate limits.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::FetchError;
use crate::model::{Activity, RepoId, RepoMetadata, StargazerRef};
use crate::source::{FetchResult, Page, PageRequest, Resource, StarSource};

/// Minimum spacing between requests when no credential is configured.
pub const UNAUTHENTICATED_MIN_DELAY: Duration = Duration::from_millis(1000);

/// Effective delay between requests.
#[must_use]
pub fn request_delay(configured_ms: u64, authenticated: bool) -> Duration {
    let configured = Duration::from_millis(configured_ms);
    if authenticated {
        configured
    } else {
        configured.max(UNAUTHENTICATED_MIN_DELAY)
    }
}

/// Process-wide request pacing.
#[derive(Debug)]
pub struct Governor {
    delay: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Governor {
    /// Space requests at least `delay` apart.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_slot: Mutex::new(None),
        }
    }

    /// Configured spacing.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Reserve the next request slot and wait for it.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = next.map_or(now, |at| at.max(now));
            *next = Some(slot + self.delay);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }

    /// Hold every request back until `until`.
    pub fn pause_until(&self, until: Instant) {
        let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        if next.is_none_or(|at| at < until) {
            *next = Some(until);
        }
    }
}

/// Retry limits and backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after transient failures.
    pub max_retries: u32,
    /// Backoff unit; the n-th retry waits `n * backoff_base`.
    pub backoff_base: Duration,
    /// Cap for a single backoff.
    pub max_backoff: Duration,
    /// Rate-limit waits per call; not counted against `max_retries`.
    pub max_rate_limit_waits: u32,
    /// Wait used when a rate limit carries no reset time.
    pub default_rate_limit_wait: Duration,
}

impl RetryPolicy {
    /// Backoff before the `attempt`-th retry (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(attempt)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            max_rate_limit_waits: settings.max_rate_limit_waits,
            default_rate_limit_wait: Duration::from_secs(settings.default_rate_limit_wait_secs),
        }
    }
}

/// A [`StarSource`] whose calls are paced and retried.
#[derive(Debug)]
pub struct GovernedSource<S> {
    inner: S,
    governor: Arc<Governor>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<S: StarSource> GovernedSource<S> {
    /// Wrap `inner`, sharing `governor` with other sources of the same run.
    pub fn new(inner: S, governor: Arc<Governor>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            governor,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon in-flight calls and waits once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[cfg(test)]
    const fn inner(&self) -> &S {
        &self.inner
    }

    async fn call<T, F, Fut>(&self, resource: Resource, mut op: F) -> FetchResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = FetchResult<T>> + Send,
        T: Send,
    {
        let mut attempts = 0_u32;
        let mut retries = 0_u32;
        let mut rate_limit_waits = 0_u32;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(cancelled(&resource)),
                () = self.governor.acquire() => {}
            }

            attempts += 1;
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(cancelled(&resource)),
                result = op() => result,
            };
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match &err {
                FetchError::RateLimited { retry_after, .. } => {
                    let retry_after = *retry_after;
                    if rate_limit_waits >= self.policy.max_rate_limit_waits {
                        return Err(exhausted(&resource, attempts, err));
                    }
                    rate_limit_waits += 1;
                    let wait = retry_after.unwrap_or(self.policy.default_rate_limit_wait);
                    warn!(
                        %resource,
                        wait_secs = wait.as_secs_f64(),
                        "Rate limited, pausing all requests"
                    );
                    self.governor.pause_until(Instant::now() + wait);
                }
                FetchError::Transient { .. } => {
                    if retries >= self.policy.max_retries {
                        return Err(exhausted(&resource, attempts, err));
                    }
                    retries += 1;
                    let wait = self.policy.backoff(retries);
                    warn!(
                        %resource,
                        attempt = attempts,
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return Err(cancelled(&resource)),
                        () = tokio::time::sleep(wait) => {}
                    }
                }
                _ => {
                    debug!(%resource, error = %err, "Non-retryable failure");
                    return Err(err);
                }
            }
        }
    }
}

fn cancelled(resource: &Resource) -> FetchError {
    FetchError::Cancelled {
        resource: resource.to_string(),
    }
}

fn exhausted(resource: &Resource, attempts: u32, last: FetchError) -> FetchError {
    FetchError::Exhausted {
        resource: resource.to_string(),
        attempts,
        source: Box::new(last),
    }
}

#[async_trait]
impl<S: StarSource> StarSource for GovernedSource<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn max_page_size(&self) -> usize {
        self.inner.max_page_size()
    }

    fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated()
    }

    async fn starred(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        self.call(Resource::Starred(login.to_string()), move || {
            self.inner.starred(login, page)
        })
        .await
    }

    async fn activity(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        self.call(Resource::Activity(login.to_string()), move || {
            self.inner.activity(login, page)
        })
        .await
    }

    async fn stargazers(
        &self,
        repo: &RepoId,
        page: PageRequest,
    ) -> FetchResult<Page<StargazerRef>> {
        self.call(Resource::Stargazers(repo.clone()), move || {
            self.inner.stargazers(repo, page)
        })
        .await
    }

    async fn metadata(&self, repo: &RepoId) -> FetchResult<RepoMetadata> {
        self.call(Resource::Metadata(repo.clone()), move || {
            self.inner.metadata(repo)
        })
        .await
    }
}
