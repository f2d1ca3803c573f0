//! Concurrent per-source fetching.
//!
//! One task per source runs in a request-scoped [`JoinSet`]. Each task
//! acquires a pooled session, calls the source's adapter, and hands the
//! session back. Every task has its own deadline, so a slow source only
//! costs its own results. Whatever happens to a source (error, timeout,
//! panic, cancellation, open circuit), it still gets an entry in the
//! outcome, possibly empty.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterRegistry, SourceAdapter};
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::error::SearchError;
use crate::pool::{SessionBackend, SessionPool};
use crate::types::{Query, RawProduct, SourceId};

use super::dedup::dedup_by_link;

/// What happened to one source during a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// The adapter returned listings.
    Ok {
        /// Listings kept after deduplication.
        count: usize,
    },
    /// The adapter succeeded but found nothing.
    Empty,
    /// The per-source deadline expired.
    TimedOut,
    /// The adapter failed or panicked.
    Failed(String),
    /// No session became free in time.
    PoolExhausted,
    /// The source's circuit is open; it was not contacted.
    Skipped,
    /// The request was cancelled before the source finished.
    Cancelled,
}

impl SourceStatus {
    /// Whether the source produced at least one listing.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Per-source listings and statuses for one fan-out.
///
/// Both maps have exactly one entry per requested source.
#[derive(Debug, Clone, Default)]
pub struct FanOutOutcome {
    /// Deduplicated listings by source.
    pub products: BTreeMap<SourceId, Vec<RawProduct>>,
    /// What happened to each source.
    pub statuses: BTreeMap<SourceId, SourceStatus>,
}

impl FanOutOutcome {
    /// Status of `source`, if it was requested.
    pub fn status(&self, source: &SourceId) -> Option<&SourceStatus> {
        self.statuses.get(source)
    }

    /// Requested sources, in order.
    pub fn sources(&self) -> Vec<SourceId> {
        self.statuses.keys().cloned().collect()
    }

    /// Total listings across all sources.
    pub fn total(&self) -> usize {
        self.products.values().map(Vec::len).sum()
    }

    /// Flatten every source's listings into one candidate list.
    pub fn into_candidates(self) -> Vec<RawProduct> {
        self.products.into_values().flatten().collect()
    }

    fn record(&mut self, source: SourceId, status: SourceStatus, products: Vec<RawProduct>) {
        self.products.insert(source.clone(), products);
        self.statuses.insert(source, status);
    }
}

/// Result of one unit before it is folded into the outcome.
enum UnitResult {
    Done(Result<Vec<RawProduct>, SearchError>),
    Cancelled,
}

/// Fans a query out over registered sources using a shared session pool.
pub struct Orchestrator<B: SessionBackend> {
    pool: SessionPool<B>,
    registry: AdapterRegistry<B::Session>,
    breaker: Option<Arc<Mutex<CircuitBreaker>>>,
}

impl<B: SessionBackend> Clone for Orchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            registry: self.registry.clone(),
            breaker: self.breaker.clone(),
        }
    }
}

impl<B: SessionBackend> Orchestrator<B> {
    /// Create an orchestrator without a circuit breaker.
    pub fn new(pool: SessionPool<B>, registry: AdapterRegistry<B::Session>) -> Self {
        Self {
            pool,
            registry,
            breaker: None,
        }
    }

    /// Skip sources whose circuit is open, and feed outcomes to `breaker`.
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(Arc::new(Mutex::new(breaker)));
        self
    }

    /// The session pool.
    pub fn pool(&self) -> &SessionPool<B> {
        &self.pool
    }

    /// The adapter registry.
    pub fn registry(&self) -> &AdapterRegistry<B::Session> {
        &self.registry
    }

    /// Snapshot of the circuit breaker's per-source health, if enabled.
    pub fn circuit_health(&self) -> Option<Vec<(SourceId, CircuitState, u32)>> {
        self.breaker.as_ref().map(|breaker| {
            breaker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .health_report()
        })
    }

    /// Fetch `query` from every registered source.
    pub async fn fan_out(
        &self,
        query: &Query,
        per_source_timeout: Duration,
        cancel: &CancellationToken,
    ) -> FanOutOutcome {
        let sources = self.registry.sources();
        self.fan_out_to(query, &sources, per_source_timeout, cancel)
            .await
    }

    /// Fetch `query` from `sources` only.
    ///
    /// Unregistered ids still get an entry, marked failed.
    pub async fn fan_out_to(
        &self,
        query: &Query,
        sources: &[SourceId],
        per_source_timeout: Duration,
        cancel: &CancellationToken,
    ) -> FanOutOutcome {
        let started = Instant::now();
        let mut outcome = FanOutOutcome::default();
        let mut units = JoinSet::new();

        for source in sources {
            let Some(adapter) = self.registry.get(source) else {
                outcome.record(
                    source.clone(),
                    SourceStatus::Failed("no adapter registered".into()),
                    Vec::new(),
                );
                continue;
            };
            if !self.breaker_allows(source) {
                tracing::debug!(source = %source, "circuit open, skipping source");
                outcome.record(source.clone(), SourceStatus::Skipped, Vec::new());
                continue;
            }

            let pool = self.pool.clone();
            let query = query.clone();
            let cancel = cancel.clone();
            let source = source.clone();
            units.spawn(async move {
                let unit_started = Instant::now();
                let result = tokio::select! {
                    _ = cancel.cancelled() => UnitResult::Cancelled,
                    fetched = run_unit(adapter, pool, query, per_source_timeout) => {
                        UnitResult::Done(fetched)
                    }
                };
                (source, result, unit_started.elapsed())
            });
        }

        while let Some(joined) = units.join_next().await {
            let (source, result, elapsed) = match joined {
                Ok(done) => done,
                Err(err) => {
                    // Units catch their own panics; this is an abort.
                    tracing::error!(error = %err, "source task aborted");
                    continue;
                }
            };
            let elapsed_ms = elapsed.as_millis() as u64;
            let (status, products) = match result {
                UnitResult::Done(Ok(products)) => {
                    let products = stamp_source(dedup_by_link(products), &source);
                    tracing::debug!(
                        source = %source,
                        count = products.len(),
                        elapsed_ms,
                        "source fetched"
                    );
                    let status = if products.is_empty() {
                        SourceStatus::Empty
                    } else {
                        SourceStatus::Ok {
                            count: products.len(),
                        }
                    };
                    (status, products)
                }
                UnitResult::Done(Err(err)) => {
                    tracing::warn!(source = %source, error = %err, elapsed_ms, "source failed");
                    (failure_status(err), Vec::new())
                }
                UnitResult::Cancelled => {
                    tracing::debug!(source = %source, elapsed_ms, "source cancelled");
                    (SourceStatus::Cancelled, Vec::new())
                }
            };
            self.feed_breaker(&source, &status);
            outcome.record(source, status, products);
        }

        for source in sources {
            if !outcome.statuses.contains_key(source) {
                outcome.record(
                    source.clone(),
                    SourceStatus::Failed("task aborted".into()),
                    Vec::new(),
                );
            }
        }

        tracing::info!(
            sources = sources.len(),
            products = outcome.total(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fan-out complete"
        );
        outcome
    }

    fn breaker_allows(&self, source: &SourceId) -> bool {
        self.breaker.as_ref().is_none_or(|breaker| {
            breaker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .should_attempt(source)
        })
    }

    fn feed_breaker(&self, source: &SourceId, status: &SourceStatus) {
        let Some(breaker) = self.breaker.as_ref() else {
            return;
        };
        let mut breaker = breaker.lock().unwrap_or_else(PoisonError::into_inner);
        match status {
            SourceStatus::Ok { .. } | SourceStatus::Empty => breaker.record_success(source),
            SourceStatus::TimedOut | SourceStatus::Failed(_) => breaker.record_failure(source),
            SourceStatus::PoolExhausted | SourceStatus::Skipped | SourceStatus::Cancelled => {}
        }
    }
}

/// Fetch `query` from every source in `registry` without a circuit breaker.
pub async fn fan_out<B: SessionBackend>(
    query: &Query,
    registry: &AdapterRegistry<B::Session>,
    pool: &SessionPool<B>,
    per_source_timeout: Duration,
    cancel: &CancellationToken,
) -> FanOutOutcome {
    Orchestrator::new(pool.clone(), registry.clone())
        .fan_out(query, per_source_timeout, cancel)
        .await
}

/// Fetch one source under its deadline.
async fn run_unit<B: SessionBackend>(
    adapter: Arc<dyn SourceAdapter<B::Session>>,
    pool: SessionPool<B>,
    query: Query,
    timeout: Duration,
) -> Result<Vec<RawProduct>, SearchError> {
    let fetch = fetch_with_session(&adapter, pool, &query);
    match tokio::time::timeout(timeout, fetch).await {
        Ok(fetched) => fetched,
        Err(_) => Err(SearchError::SourceTimeout {
            source_id: adapter.source().clone(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

async fn fetch_with_session<B: SessionBackend>(
    adapter: &Arc<dyn SourceAdapter<B::Session>>,
    pool: SessionPool<B>,
    query: &Query,
) -> Result<Vec<RawProduct>, SearchError> {
    let mut session = pool.acquire().await?;
    let fetched = AssertUnwindSafe(adapter.fetch(&mut *session, query))
        .catch_unwind()
        .await;
    session.release().await;

    let reason = match fetched {
        Ok(Ok(products)) => return Ok(products),
        Ok(Err(err)) => err.to_string(),
        Err(_) => "adapter panicked".to_string(),
    };
    Err(SearchError::Source {
        source_id: adapter.source().clone(),
        reason,
    })
}

fn failure_status(err: SearchError) -> SourceStatus {
    match err {
        SearchError::PoolExhausted { .. } => SourceStatus::PoolExhausted,
        SearchError::SourceTimeout { .. } => SourceStatus::TimedOut,
        SearchError::Source { reason, .. } => SourceStatus::Failed(reason),
        other => SourceStatus::Failed(other.to_string()),
    }
}

fn stamp_source(mut products: Vec<RawProduct>, source: &SourceId) -> Vec<RawProduct> {
    for product in &mut products {
        if &product.source != source {
            product.source = source.clone();
        }
    }
    products
}
