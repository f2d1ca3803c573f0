//! Engine configuration with sensible defaults.
//!
//! [`EngineConfig`] controls pool sizing, per-source and update budgets,
//! result caching, ranking threshold, retries, and the optional circuit
//! breaker. All fields have defaults so a partial TOML table is enough.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::SearchError;

/// Retry policy applied around adapters wrapped in [`crate::adapter::Retrying`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one. `1` disables retries.
    pub attempts: u32,
    /// Pause between attempts in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 1_000,
        }
    }
}

/// Configuration for the search aggregation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of fetch sessions created at startup.
    pub pool_size: usize,
    /// How long a source unit waits for a free session.
    pub acquire_timeout_ms: u64,
    /// Budget for one source during a normal search.
    pub per_source_timeout_ms: u64,
    /// Budget for one source when backfilling empty sources.
    pub update_timeout_ms: u64,
    /// How long cached results stay valid. `0` disables caching.
    pub cache_ttl_secs: u64,
    /// Upper bound on cached query entries.
    pub cache_max_entries: u64,
    /// Candidates scoring below this are dropped.
    pub similarity_threshold: f64,
    /// Retry policy for adapters built from configuration.
    pub retry: RetryConfig,
    /// Per-source circuit breaker; disabled when absent.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            acquire_timeout_ms: 5_000,
            per_source_timeout_ms: 30_000,
            update_timeout_ms: 60_000,
            cache_ttl_secs: 300,
            cache_max_entries: 1_000,
            similarity_threshold: 60.0,
            retry: RetryConfig::default(),
            circuit_breaker: None,
        }
    }
}

impl EngineConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `pool_size` must be greater than 0
    /// - all timeouts must be greater than 0
    /// - `update_timeout_ms` must be >= `per_source_timeout_ms`
    /// - `similarity_threshold` must be finite and non-negative
    /// - `retry.attempts` must be at least 1
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.pool_size == 0 {
            return Err(SearchError::Config(
                "pool_size must be greater than 0".into(),
            ));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(SearchError::Config(
                "acquire_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.per_source_timeout_ms == 0 {
            return Err(SearchError::Config(
                "per_source_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.update_timeout_ms < self.per_source_timeout_ms {
            return Err(SearchError::Config(
                "update_timeout_ms must be >= per_source_timeout_ms".into(),
            ));
        }
        if !self.similarity_threshold.is_finite() || self.similarity_threshold < 0.0 {
            return Err(SearchError::Config(
                "similarity_threshold must be a non-negative number".into(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(SearchError::Config(
                "retry.attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Session acquire budget.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Per-source budget for a normal search.
    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_millis(self.per_source_timeout_ms)
    }

    /// Per-source budget in update (backfill) mode.
    pub fn update_timeout(&self) -> Duration {
        Duration::from_millis(self.update_timeout_ms)
    }

    /// Result cache time-to-live.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let config = EngineConfig::default();
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.per_source_timeout(), Duration::from_secs(30));
        assert_eq!(config.update_timeout(), Duration::from_secs(60));
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert!((config.similarity_threshold - 60.0).abs() < f64::EPSILON);
        assert_eq!(config.retry.attempts, 3);
        assert!(config.circuit_breaker.is_none());
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_pool_size_rejected() {
        let config = EngineConfig {
            pool_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pool_size"));
    }

    #[test]
    fn zero_timeouts_rejected() {
        let config = EngineConfig {
            acquire_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("acquire"));

        let config = EngineConfig {
            per_source_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("per_source_timeout_ms"));
    }

    #[test]
    fn update_timeout_shorter_than_search_timeout_rejected() {
        let config = EngineConfig {
            per_source_timeout_ms: 10_000,
            update_timeout_ms: 5_000,
            ..Default::default()
        };
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("update_timeout_ms"));
    }

    #[test]
    fn negative_or_nan_threshold_rejected() {
        for threshold in [-1.0, f64::NAN, f64::INFINITY] {
            let config = EngineConfig {
                similarity_threshold: threshold,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "threshold {threshold} accepted");
        }
    }

    #[test]
    fn zero_retry_attempts_rejected() {
        let config = EngineConfig {
            retry: RetryConfig {
                attempts: 0,
                backoff_ms: 0,
            },
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("retry"));
    }

    #[test]
    fn partial_json_table_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"pool_size": 4, "similarity_threshold": 75.0}"#)
                .expect("deserialize");
        assert_eq!(config.pool_size, 4);
        assert!((config.similarity_threshold - 75.0).abs() < f64::EPSILON);
        assert_eq!(config.per_source_timeout_ms, 30_000);
    }
}
