//! Error types for the procura-search crate.
//!
//! Per-source failures never reach the caller of a search. The
//! orchestrator turns each one into a [`SearchError::SourceTimeout`] or
//! [`SearchError::Source`], logs it, and reports an empty group. The
//! variants a caller sees come from pool acquisition, configuration,
//! query validation, and internal faults.

use crate::types::SourceId;

/// Errors that can occur while aggregating product search results.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The query was empty or contained only whitespace.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// No fetch session became available within the acquire timeout.
    #[error("session pool exhausted after {waited_ms} ms")]
    PoolExhausted {
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// The pool has been shut down and hands out no more sessions.
    #[error("session pool is closed")]
    PoolClosed,

    /// The pool could not create its initial sessions.
    #[error("session pool initialisation failed: {0}")]
    PoolInit(String),

    /// A source adapter exceeded its time budget.
    #[error("source {source_id} timed out after {timeout_ms} ms")]
    SourceTimeout {
        /// The source that timed out.
        source_id: SourceId,
        /// The budget it exceeded.
        timeout_ms: u64,
    },

    /// A source adapter failed.
    #[error("source {source_id} failed: {reason}")]
    Source {
        /// The failing source.
        source_id: SourceId,
        /// Human-readable cause.
        reason: String,
    },

    /// Invalid engine or adapter configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A catalogue page or fixture could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Unrecoverable fault inside the cache or ranker for this request.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors reported by a [`crate::pool::SessionBackend`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// A new session could not be created.
    #[error("session creation failed: {0}")]
    Create(String),

    /// Session-local state could not be fully cleared, but the session
    /// itself is still usable.
    #[error("session sanitisation failed: {0}")]
    Sanitize(String),

    /// The session is unusable and must be discarded.
    #[error("session broken: {0}")]
    Broken(String),
}

/// Error returned by a [`crate::adapter::SourceAdapter`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// The catalogue could not be reached or answered with an error status.
    #[error("request failed: {0}")]
    Request(String),

    /// The catalogue answered but its content could not be understood.
    #[error("unexpected page structure: {0}")]
    Parse(String),

    /// The session handed to the adapter could not be used.
    #[error("session unusable: {0}")]
    Session(String),
}

/// Convenience type alias for procura-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
