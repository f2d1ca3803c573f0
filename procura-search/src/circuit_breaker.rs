//! Per-source circuit breaker.
//!
//! Tracks consecutive failures per source and temporarily skips sources
//! that keep failing or timing out. After a cooldown, a tripped source is
//! half-open: the next search tries it again and its outcome decides whether
//! the circuit closes again or re-trips.
//!
//! A skipped source still appears in the results, as an empty group.
//!
//! ```text
//! Closed --(failure_threshold consecutive failures)--> Open
//! Open   --(cooldown elapsed, next search)-----------> HalfOpen
//! HalfOpen --(success)--> Closed
//! HalfOpen --(failure)--> Open, cooldown restarts
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::SourceId;

/// Circuit state for a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Source is healthy; fetches go through.
    Closed,
    /// Source failed too often; fetches are skipped until cooldown expires.
    Open,
    /// Cooldown elapsed; the next fetch is a trial.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct Health {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds spent open before a trial fetch is allowed.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

/// Per-source circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    sources: HashMap<SourceId, Health>,
}

impl CircuitBreaker {
    /// Create a breaker with the given thresholds.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
            sources: HashMap::new(),
        }
    }

    /// Record a successful fetch. Closes the circuit.
    pub fn record_success(&mut self, source: &SourceId) {
        if let Some(health) = self.sources.get_mut(source) {
            if health.state != CircuitState::Closed {
                tracing::info!(source = %source, "source circuit closed");
            }
            *health = Health::default();
        }
    }

    /// Record a failed or timed-out fetch.
    ///
    /// Opens the circuit once `failure_threshold` failures have happened in
    /// a row. A failed half-open trial reopens it immediately.
    pub fn record_failure(&mut self, source: &SourceId) {
        let health = self.sources.entry(source.clone()).or_default();
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);

        let trips = health.state == CircuitState::HalfOpen
            || (health.state == CircuitState::Closed
                && health.consecutive_failures >= self.failure_threshold);
        if trips {
            health.state = CircuitState::Open;
            health.opened_at = Some(Instant::now());
            tracing::warn!(
                source = %source,
                failures = health.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "source circuit opened"
            );
        }
    }

    /// Whether a fetch from `source` should be attempted now.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and
    /// allows the attempt.
    pub fn should_attempt(&mut self, source: &SourceId) -> bool {
        let Some(health) = self.sources.get_mut(source) else {
            return true;
        };
        if health.state != CircuitState::Open {
            return true;
        }
        let cooled_down = health
            .opened_at
            .is_none_or(|opened| opened.elapsed() >= self.cooldown);
        if cooled_down {
            health.state = CircuitState::HalfOpen;
            tracing::debug!(source = %source, "source circuit half-open, probing");
        }
        cooled_down
    }

    /// Current state for `source`; unseen sources are closed.
    pub fn source_status(&self, source: &SourceId) -> CircuitState {
        self.sources
            .get(source)
            .map_or(CircuitState::Closed, |h| h.state)
    }

    /// `(source, state, consecutive_failures)` for every source with a
    /// failure on record, sorted by source.
    pub fn health_report(&self) -> Vec<(SourceId, CircuitState, u32)> {
        let mut report: Vec<_> = self
            .sources
            .iter()
            .map(|(source, health)| (source.clone(), health.state, health.consecutive_failures))
            .collect();
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }
}
