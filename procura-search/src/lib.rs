//! # procura-search
//!
//! Product search aggregation across supplier catalogues.
//!
//! A query fans out to every registered catalogue concurrently, each
//! fetch running on a session borrowed from a bounded pool. Listings are
//! deduplicated per source, scored against the query with a fuzzy,
//! morphology-aware ranker, grouped by source, and cached so that a
//! narrower follow-up query (`стакан` → `стакан 200`) is answered without
//! touching the network.
//!
//! ## Design
//!
//! - Sessions are expensive and stateful: they are created once, reused,
//!   and sanitised between uses by a [`SessionBackend`]
//! - A slow or failing catalogue never delays or fails the others; it
//!   shows up as an empty group
//! - Catalogues are plain data: [`SelectorAdapter`] scrapes any search
//!   page described by CSS selectors
//! - Ranking is deterministic for the same query, candidates, and lexicon
//!
//! ## Privacy
//!
//! Query text is logged only at debug and trace level.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use procura_search::{
//!     AdapterRegistry, EngineConfig, HttpSessionBackend, Lexicon, QueryContext,
//!     SearchService, SelectorAdapter, SelectorSpec, SourceId,
//! };
//!
//! # async fn example(spec: SelectorSpec) -> procura_search::Result<()> {
//! let mut registry = AdapterRegistry::new();
//! registry.register(SelectorAdapter::new(SourceId::new("gudvin"), &spec)?)?;
//!
//! let service = SearchService::from_config(
//!     HttpSessionBackend::default(),
//!     registry,
//!     EngineConfig::default(),
//!     Arc::new(Lexicon::default()),
//! )
//! .await?;
//!
//! let mut ctx = QueryContext::new();
//! let results = service.search("стакан бумажный", &mut ctx).await?;
//! for (source, group) in results.iter() {
//!     println!("{source}: {} products", group.count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod pool;
pub mod present;
pub mod ranking;
pub mod service;
pub mod types;

pub use adapter::{AdapterRegistry, Retrying, SourceAdapter};
pub use adapters::{FieldSpec, FixtureAdapter, SelectorAdapter, SelectorSpec};
pub use cache::RefinementCache;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{EngineConfig, RetryConfig};
pub use error::{Result, SearchError, SessionError, SourceError};
pub use http::{HttpConfig, HttpSession, HttpSessionBackend};
pub use orchestrator::{fan_out, FanOutOutcome, Orchestrator, SourceStatus};
pub use pool::{PooledSession, SessionBackend, SessionPool};
pub use present::{GroupedResults, ProductView, ResultFilter, SortOrder, SourceGroup};
pub use ranking::{Lexicon, LexiconConfig, Ranker};
pub use service::{QueryContext, SearchService};
pub use types::{Availability, Query, RankedProduct, RawProduct, SourceId};
