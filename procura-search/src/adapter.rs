//! Source adapter trait and the registry the orchestrator fans out over.
//!
//! Each supplier catalogue implements [`SourceAdapter`] to turn a query
//! into [`RawProduct`] listings using a pooled session. Adapters are
//! registered by [`SourceId`] in an [`AdapterRegistry`] and dispatched
//! through trait objects, so the set of sources is plain data.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RetryConfig;
use crate::error::{SearchError, SourceError};
use crate::types::{Query, RawProduct, SourceId};

/// A pluggable supplier catalogue.
///
/// Implementors handle their own:
///
/// - URL construction with query encoding
/// - Page retrieval through the session they are given
/// - Extraction of listings from the page
///
/// A fetch may take as long as it likes and may fail for any reason; the
/// orchestrator bounds it with the per-source timeout and maps failures
/// to an empty result. The session must be left usable; the pool
/// sanitises it afterwards.
#[async_trait]
pub trait SourceAdapter<S>: Send + Sync {
    /// The source this adapter serves.
    fn source(&self) -> &SourceId;

    /// Fetch listings for `query` using `session`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the catalogue cannot be reached or its
    /// page cannot be understood.
    async fn fetch(&self, session: &mut S, query: &Query) -> Result<Vec<RawProduct>, SourceError>;
}

/// Adapters keyed by source, iterated in source order.
pub struct AdapterRegistry<S> {
    adapters: BTreeMap<SourceId, Arc<dyn SourceAdapter<S>>>,
}

impl<S> Clone for AdapterRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            adapters: self.adapters.clone(),
        }
    }
}

impl<S> Default for AdapterRegistry<S> {
    fn default() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }
}

impl<S: Send + 'static> AdapterRegistry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own source id.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the source is already registered.
    pub fn register<A>(&mut self, adapter: A) -> Result<(), SearchError>
    where
        A: SourceAdapter<S> + 'static,
    {
        self.register_arc(Arc::new(adapter))
    }

    /// Register an already shared adapter.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the source is already registered.
    pub fn register_arc(&mut self, adapter: Arc<dyn SourceAdapter<S>>) -> Result<(), SearchError> {
        let source = adapter.source().clone();
        if self.adapters.contains_key(&source) {
            return Err(SearchError::Config(format!(
                "source {source} registered twice"
            )));
        }
        self.adapters.insert(source, adapter);
        Ok(())
    }

    /// Look up the adapter for `source`.
    pub fn get(&self, source: &SourceId) -> Option<Arc<dyn SourceAdapter<S>>> {
        self.adapters.get(source).cloned()
    }

    /// All registered sources, in order.
    pub fn sources(&self) -> Vec<SourceId> {
        self.adapters.keys().cloned().collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no source is registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Iterate over `(source, adapter)` pairs in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&SourceId, &Arc<dyn SourceAdapter<S>>)> {
        self.adapters.iter()
    }
}

/// Retries a wrapped adapter on request and parse failures.
///
/// Session failures are returned immediately, since another attempt on
/// the same session would fail the same way.
pub struct Retrying<A> {
    inner: A,
    attempts: u32,
    backoff: Duration,
}

impl<A> Retrying<A> {
    /// Wrap `inner` with the given policy.
    pub fn new(inner: A, policy: &RetryConfig) -> Self {
        Self {
            inner,
            attempts: policy.attempts.max(1),
            backoff: Duration::from_millis(policy.backoff_ms),
        }
    }
}

#[async_trait]
impl<S, A> SourceAdapter<S> for Retrying<A>
where
    S: Send,
    A: SourceAdapter<S>,
{
    fn source(&self) -> &SourceId {
        self.inner.source()
    }

    async fn fetch(&self, session: &mut S, query: &Query) -> Result<Vec<RawProduct>, SourceError> {
        let mut attempt = 1;
        loop {
            match self.inner.fetch(session, query).await {
                Ok(products) => return Ok(products),
                Err(err @ SourceError::Session(_)) => return Err(err),
                Err(err) if attempt >= self.attempts => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        source = %self.inner.source(),
                        attempt,
                        attempts = self.attempts,
                        error = %err,
                        "source fetch failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyAdapter {
        source: SourceId,
        failures_before_success: u32,
        calls: AtomicU32,
        error: SourceError,
    }

    #[async_trait]
    impl SourceAdapter<()> for FlakyAdapter {
        fn source(&self) -> &SourceId {
            &self.source
        }

        async fn fetch(
            &self,
            _session: &mut (),
            query: &Query,
        ) -> Result<Vec<RawProduct>, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(self.error.clone());
            }
            Ok(vec![RawProduct::new(
                self.source.clone(),
                query.raw(),
                "https://example.ru/p/1",
            )])
        }
    }

    fn flaky(failures: u32, error: SourceError) -> FlakyAdapter {
        FlakyAdapter {
            source: SourceId::new("gudvin"),
            failures_before_success: failures,
            calls: AtomicU32::new(0),
            error,
        }
    }

    fn policy(attempts: u32) -> RetryConfig {
        RetryConfig {
            attempts,
            backoff_ms: 1,
        }
    }

    #[test]
    fn adapter_trait_object_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn SourceAdapter<()>>();
    }

    #[test]
    fn registry_rejects_duplicate_sources() {
        let mut registry: AdapterRegistry<()> = AdapterRegistry::new();
        registry
            .register(flaky(0, SourceError::Request("x".into())))
            .expect("first");
        let err = registry
            .register(flaky(0, SourceError::Request("x".into())))
            .unwrap_err();
        assert!(err.to_string().contains("registered twice"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn retrying_recovers_from_transient_failures() {
        let adapter = Retrying::new(flaky(2, SourceError::Request("timeout".into())), &policy(3));
        let query = Query::parse("стакан").expect("query");
        let products = adapter
            .fetch(&mut (), &query)
            .await
            .expect("third attempt succeeds");
        assert_eq!(products.len(), 1);
        assert_eq!(adapter.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retrying_gives_up_after_attempts() {
        let adapter = Retrying::new(flaky(5, SourceError::Parse("no cards".into())), &policy(2));
        let query = Query::parse("стакан").expect("query");
        assert!(adapter.fetch(&mut (), &query).await.is_err());
        assert_eq!(adapter.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retrying_does_not_retry_session_errors() {
        let adapter = Retrying::new(flaky(5, SourceError::Session("closed".into())), &policy(3));
        let query = Query::parse("стакан").expect("query");
        assert!(adapter.fetch(&mut (), &query).await.is_err());
        assert_eq!(adapter.inner.calls.load(Ordering::SeqCst), 1);
    }
}
