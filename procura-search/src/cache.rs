//! Query result cache with refinement.
//!
//! Caches the grouped, ranked result of each normalised query. Uses
//! [`moka`] for async-friendly caching with TTL and a capacity bound.
//!
//! When a user narrows their previous query (for example `стакан` →
//! `стакан 200`), the cached result of the previous query is filtered
//! down instead of fetching from every source again.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::config::EngineConfig;
use crate::present::GroupedResults;
use crate::types::Query;

/// Cache of grouped results keyed by normalised query.
#[derive(Clone)]
pub struct RefinementCache {
    /// `None` when caching is disabled (zero TTL).
    entries: Option<Cache<String, Arc<GroupedResults>>>,
}

impl RefinementCache {
    /// Create a cache whose entries live for `ttl`, holding at most
    /// `max_entries`. A zero `ttl` disables caching.
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let entries = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build()
        });
        Self { entries }
    }

    /// Create a cache sized from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.cache_ttl(), config.cache_max_entries)
    }

    /// Whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// Cached result for `query`, if present and not expired.
    pub async fn lookup(&self, query: &Query) -> Option<Arc<GroupedResults>> {
        let entries = self.entries.as_ref()?;
        let hit = entries.get(query.normalized()).await;
        tracing::trace!(query = %query, hit = hit.is_some(), "cache lookup");
        hit
    }

    /// Store `result` under `query`, replacing any previous entry.
    pub async fn store(&self, query: &Query, result: Arc<GroupedResults>) {
        if let Some(entries) = &self.entries {
            entries.insert(query.normalized().to_string(), result).await;
        }
    }

    /// Derive the result of `query` from the cached result of `previous`.
    ///
    /// Returns `None` unless `query` refines `previous` (see
    /// [`is_refinement`]) and `previous` is still cached. On success the
    /// derived result is stored under `query`; the entry of `previous` is
    /// left untouched.
    pub async fn refine(&self, previous: &Query, query: &Query) -> Option<Arc<GroupedResults>> {
        if !is_refinement(previous.normalized(), query.normalized()) {
            return None;
        }
        let base = self.lookup(previous).await?;
        let tokens: Vec<String> = query.tokens().map(str::to_string).collect();
        let refined = Arc::new(base.filter_by_tokens(&tokens));
        tracing::debug!(
            from = %previous,
            to = %query,
            before = base.total(),
            after = refined.total(),
            "served refinement from cache"
        );
        self.store(query, Arc::clone(&refined)).await;
        Some(refined)
    }

    /// Approximate number of live entries.
    pub async fn entry_count(&self) -> u64 {
        match &self.entries {
            Some(entries) => {
                entries.run_pending_tasks().await;
                entries.entry_count()
            }
            None => 0,
        }
    }
}

impl std::fmt::Debug for RefinementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefinementCache")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn token_set(text: &str) -> BTreeSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Whether `new` narrows `previous`.
///
/// True iff the token sets differ and every non-numeric token of
/// `previous` also appears in `new`. Numeric tokens of `previous` may
/// change freely (`стакан 200` → `стакан 300`).
pub fn is_refinement(previous: &str, new: &str) -> bool {
    let previous = token_set(previous);
    let new = token_set(new);
    if previous == new {
        return false;
    }
    previous
        .iter()
        .filter(|token| !is_numeric_token(token))
        .all(|token| new.contains(token))
}

/// Digits only, with at most one `.` or `,` between digits.
pub fn is_numeric_token(token: &str) -> bool {
    let mut parts = token.splitn(2, ['.', ',']);
    let whole = parts.next().unwrap_or_default();
    let is_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    match parts.next() {
        None => is_digits(whole),
        Some(fraction) => is_digits(whole) && is_digits(fraction),
    }
}
