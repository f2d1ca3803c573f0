//! Error types for the procura host.

use procura_search::SearchError;

/// Top-level error type for the host: configuration, I/O, and search.
#[derive(Debug, thiserror::Error)]
pub enum ProcuraError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised by the search engine.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Logging could not be initialised.
    #[error("logging error: {0}")]
    Logging(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ProcuraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_errors_are_transparent() {
        let err: ProcuraError = SearchError::InvalidQuery("query is empty".into()).into();
        assert_eq!(err.to_string(), "invalid query: query is empty");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ProcuraError = io.into();
        assert!(matches!(err, ProcuraError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: missing");
    }
}
