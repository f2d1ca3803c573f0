//! The search facade: cache, refinement, fan-out, ranking, grouping.
//!
//! # Pipeline
//!
//! 1. Validate and normalise the query
//! 2. Serve from the cache on an exact hit
//! 3. Serve a refinement of the caller's previous query from the cache
//! 4. Otherwise fan out to every source, rank, group, and cache

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterRegistry;
use crate::cache::RefinementCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::EngineConfig;
use crate::error::SearchError;
use crate::orchestrator::{FanOutOutcome, Orchestrator};
use crate::pool::{SessionBackend, SessionPool};
use crate::present::GroupedResults;
use crate::ranking::{Lexicon, Ranker};
use crate::types::{Query, SourceId};

/// Per-caller search state: the last query that was fully served.
///
/// Owned by whoever represents the user's session (a web session, a CLI
/// invocation) and passed to every [`SearchService::search`] call.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    last_query: Option<Query>,
}

impl QueryContext {
    /// Fresh context with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last successfully served query.
    pub fn last_query(&self) -> Option<&Query> {
        self.last_query.as_ref()
    }

    fn remember(&mut self, query: Query) {
        self.last_query = Some(query);
    }

    /// Forget the history.
    pub fn clear(&mut self) {
        self.last_query = None;
    }
}

/// Aggregated product search over every registered source.
pub struct SearchService<B: SessionBackend> {
    orchestrator: Orchestrator<B>,
    ranker: Ranker,
    cache: RefinementCache,
    config: EngineConfig,
}

impl<B: SessionBackend> SearchService<B> {
    /// Build the service from its parts.
    pub fn new(
        orchestrator: Orchestrator<B>,
        ranker: Ranker,
        cache: RefinementCache,
        config: EngineConfig,
    ) -> Self {
        Self {
            orchestrator,
            ranker,
            cache,
            config,
        }
    }

    /// Validate `config`, create the session pool, and wire everything up.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for invalid configuration and
    /// [`SearchError::PoolInit`] if the sessions cannot be created.
    pub async fn from_config(
        backend: B,
        registry: AdapterRegistry<B::Session>,
        config: EngineConfig,
        lexicon: Arc<Lexicon>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        if registry.is_empty() {
            return Err(SearchError::Config("no sources registered".into()));
        }

        let pool = SessionPool::new(backend, config.pool_size, config.acquire_timeout()).await?;
        let mut orchestrator = Orchestrator::new(pool, registry);
        if let Some(breaker) = &config.circuit_breaker {
            orchestrator = orchestrator.with_circuit_breaker(CircuitBreaker::new(breaker.clone()));
        }

        tracing::info!(
            sources = orchestrator.registry().len(),
            pool_size = config.pool_size,
            "search service ready"
        );

        Ok(Self::new(
            orchestrator,
            Ranker::new(lexicon, config.similarity_threshold),
            RefinementCache::from_config(&config),
            config,
        ))
    }

    /// Search `text` on behalf of the caller owning `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidQuery`] for empty input. Source
    /// failures never surface here; they show up as empty groups.
    pub async fn search(
        &self,
        text: &str,
        ctx: &mut QueryContext,
    ) -> Result<Arc<GroupedResults>, SearchError> {
        self.search_with_cancel(text, ctx, CancellationToken::new())
            .await
    }

    /// Like [`SearchService::search`], abandoning in-flight sources when
    /// `cancel` fires.
    ///
    /// A cancelled search returns what finished in time. Its result is
    /// neither cached nor remembered in `ctx`.
    ///
    /// # Errors
    ///
    /// See [`SearchService::search`].
    pub async fn search_with_cancel(
        &self,
        text: &str,
        ctx: &mut QueryContext,
        cancel: CancellationToken,
    ) -> Result<Arc<GroupedResults>, SearchError> {
        let query = Query::parse(text)?;

        if let Some(hit) = self.cache.lookup(&query).await {
            tracing::debug!(query = %query, "served from cache");
            ctx.remember(query);
            return Ok(hit);
        }

        if let Some(previous) = ctx.last_query().cloned() {
            if let Some(refined) = self.cache.refine(&previous, &query).await {
                ctx.remember(query);
                return Ok(refined);
            }
        }

        let result = self.fetch_and_rank(&query, &cancel).await;
        if cancel.is_cancelled() {
            tracing::debug!(query = %query, "search cancelled, result not cached");
            return Ok(result);
        }

        self.cache.store(&query, Arc::clone(&result)).await;
        ctx.remember(query);
        Ok(result)
    }

    /// Backfill the cached result of `text` from sources that came back
    /// empty, using the longer update budget.
    ///
    /// Only groups that are empty in the cached result are replaced, and
    /// only by non-empty new groups. Without a cached result this is a
    /// full search.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidQuery`] for empty input.
    pub async fn search_update(&self, text: &str) -> Result<Arc<GroupedResults>, SearchError> {
        let query = Query::parse(text)?;
        let cancel = CancellationToken::new();

        let Some(cached) = self.cache.lookup(&query).await else {
            tracing::debug!(query = %query, "nothing cached, running full search");
            let result = self.fetch_and_rank(&query, &cancel).await;
            self.cache.store(&query, Arc::clone(&result)).await;
            return Ok(result);
        };

        let empty = cached.empty_sources();
        if empty.is_empty() {
            return Ok(cached);
        }

        let outcome = self
            .orchestrator
            .fan_out_to(&query, &empty, self.config.update_timeout(), &cancel)
            .await;
        let update = self.rank_and_group(&query, outcome, &empty);
        let merged = Arc::new(cached.merge_non_empty(&update));
        tracing::info!(
            retried = empty.len(),
            filled = empty.len() - merged.empty_sources().len(),
            "update search merged"
        );
        self.cache.store(&query, Arc::clone(&merged)).await;
        Ok(merged)
    }

    /// Fetch `text` from every source and overwrite its cache entry,
    /// ignoring any cached result.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidQuery`] for empty input.
    pub async fn refresh(&self, text: &str) -> Result<Arc<GroupedResults>, SearchError> {
        let query = Query::parse(text)?;
        let result = self.fetch_and_rank(&query, &CancellationToken::new()).await;
        self.cache.store(&query, Arc::clone(&result)).await;
        Ok(result)
    }

    /// Close the session pool.
    pub async fn shutdown(&self) {
        self.orchestrator.pool().shutdown().await;
    }

    /// The orchestrator (pool, registry, circuit breaker).
    pub fn orchestrator(&self) -> &Orchestrator<B> {
        &self.orchestrator
    }

    /// The session pool.
    pub fn pool(&self) -> &SessionPool<B> {
        self.orchestrator.pool()
    }

    /// The ranker.
    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    /// The result cache.
    pub fn cache(&self) -> &RefinementCache {
        &self.cache
    }

    /// Engine configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn fetch_and_rank(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Arc<GroupedResults> {
        let started = Instant::now();
        let sources = self.orchestrator.registry().sources();
        let outcome = self
            .orchestrator
            .fan_out_to(query, &sources, self.config.per_source_timeout(), cancel)
            .await;
        let grouped = self.rank_and_group(query, outcome, &sources);
        tracing::info!(
            sources = sources.len(),
            results = grouped.total(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Arc::new(grouped)
    }

    fn rank_and_group(
        &self,
        query: &Query,
        outcome: FanOutOutcome,
        sources: &[SourceId],
    ) -> GroupedResults {
        let ranked = self.ranker.rank(query, outcome.into_candidates());
        GroupedResults::group(ranked, sources)
    }
}
