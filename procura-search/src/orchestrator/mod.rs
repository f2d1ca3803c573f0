//! Search orchestrator: concurrent per-source fetching and deduplication.
//!
//! This module fans a query out to every source concurrently, bounds each
//! source with its own deadline, absorbs per-source failures, and
//! deduplicates each source's listings by normalised link.

pub mod dedup;
pub mod fanout;
pub mod url_normalize;

pub use fanout::{fan_out, FanOutOutcome, Orchestrator, SourceStatus};
