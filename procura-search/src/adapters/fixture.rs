//! Offline catalogue backed by a fixed product list.
//!
//! Serves the same listings for every query and leaves narrowing to the
//! ranker. Useful for demos, local development, and tests that must not
//! touch the network.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::SourceAdapter;
use crate::error::{SearchError, SourceError};
use crate::types::{Query, RawProduct, SourceId};

/// Adapter returning a fixed catalogue, usable with any session type.
#[derive(Debug, Clone)]
pub struct FixtureAdapter {
    source: SourceId,
    products: Vec<RawProduct>,
    delay: Duration,
}

impl FixtureAdapter {
    /// Serve `products` as `source`. Each listing's source is overwritten.
    pub fn new(source: SourceId, products: Vec<RawProduct>) -> Self {
        let products = products
            .into_iter()
            .map(|mut p| {
                p.source = source.clone();
                p
            })
            .collect();
        Self {
            source,
            products,
            delay: Duration::ZERO,
        }
    }

    /// Load a JSON array of listings from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the file cannot be read and
    /// [`SearchError::Parse`] if it is not a JSON array of listings.
    pub fn from_file(source: SourceId, path: &Path) -> Result<Self, SearchError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Config(format!("cannot read fixture {}: {e}", path.display()))
        })?;
        let products: Vec<RawProduct> = serde_json::from_str(&text).map_err(|e| {
            SearchError::Parse(format!("invalid fixture {}: {e}", path.display()))
        })?;
        Ok(Self::new(source, products))
    }

    /// Simulate a slow catalogue by sleeping before every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of listings served.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the catalogue is empty.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[async_trait]
impl<S: Send> SourceAdapter<S> for FixtureAdapter {
    fn source(&self) -> &SourceId {
        &self.source
    }

    async fn fetch(
        &self,
        _session: &mut S,
        query: &Query,
    ) -> Result<Vec<RawProduct>, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        tracing::trace!(
            source = %self.source,
            query = %query,
            count = self.products.len(),
            "serving fixture"
        );
        Ok(self.products.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn serves_products_under_own_source() {
        let stray = RawProduct::new(SourceId::new("other"), "Стакан", "https://x/1");
        let adapter = FixtureAdapter::new(SourceId::new("local"), vec![stray]);
        let query = Query::parse("стакан").expect("query");
        let products = SourceAdapter::<()>::fetch(&adapter, &mut (), &query)
            .await
            .expect("fetch");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].source, SourceId::new("local"));
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"[{{"name":"Крышка","source":"x","link":"https://x/k","price":2.5}},
               {{"name":"Стакан","source":"x","link":"https://x/s"}}]"#
        )
        .expect("write");
        let adapter =
            FixtureAdapter::from_file(SourceId::new("local"), file.path()).expect("load");
        assert_eq!(adapter.len(), 2);
        assert!(adapter
            .products
            .iter()
            .all(|p| p.source.as_str() == "local"));
    }

    #[test]
    fn invalid_files_are_rejected() {
        let missing =
            FixtureAdapter::from_file(SourceId::new("x"), Path::new("/nonexistent/fixture.json"));
        assert!(matches!(missing, Err(SearchError::Config(_))));

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{{not json").expect("write");
        let invalid = FixtureAdapter::from_file(SourceId::new("x"), file.path());
        assert!(matches!(invalid, Err(SearchError::Parse(_))));
    }
}
