//! Periodic cache warm-up.
//!
//! Re-fetches a fixed list of popular queries on an interval so that user
//! searches for them are served from the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use procura_search::{SearchService, SessionBackend};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WarmupConfig;

/// Outcome of one warm-up round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupReport {
    /// Queries refreshed successfully.
    pub refreshed: usize,
    /// Queries rejected by the service.
    pub failed: usize,
    /// Listings cached across all refreshed queries.
    pub listings: usize,
    /// Wall time of the round in milliseconds.
    pub elapsed_ms: u64,
}

/// Background task refreshing `queries` every `interval`.
pub struct Warmup<B: SessionBackend> {
    service: Arc<SearchService<B>>,
    queries: Vec<String>,
    interval: Duration,
    run_immediately: bool,
    report_tx: Option<mpsc::UnboundedSender<WarmupReport>>,
}

impl<B: SessionBackend> Warmup<B> {
    /// Create a warm-up task from configuration.
    pub fn new(service: Arc<SearchService<B>>, config: &WarmupConfig) -> Self {
        Self {
            service,
            queries: config.queries.clone(),
            interval: Duration::from_secs(config.interval_secs.max(1)),
            run_immediately: config.run_immediately,
            report_tx: None,
        }
    }

    /// Send a [`WarmupReport`] after every round.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<WarmupReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    /// Refresh every query once, in order.
    pub async fn run_round(&self) -> WarmupReport {
        let started = Instant::now();
        let mut report = WarmupReport::default();
        for query in &self.queries {
            match self.service.refresh(query).await {
                Ok(result) => {
                    report.refreshed += 1;
                    report.listings += result.total();
                    debug!(query = %query, listings = result.total(), "query warmed");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(query = %query, error = %e, "warm-up query rejected");
                }
            }
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            refreshed = report.refreshed,
            failed = report.failed,
            listings = report.listings,
            elapsed_ms = report.elapsed_ms,
            "warm-up round complete"
        );
        report
    }

    /// Run rounds until `cancel` fires. The first round starts after one
    /// interval unless `run_immediately` is set.
    pub async fn run(self, cancel: CancellationToken) {
        let start = if self.run_immediately {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + self.interval
        };
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            queries = self.queries.len(),
            interval_secs = self.interval.as_secs(),
            "warm-up started"
        );
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let report = tokio::select! {
                () = cancel.cancelled() => break,
                report = self.run_round() => report,
            };
            if let Some(tx) = &self.report_tx {
                if tx.send(report).is_err() {
                    debug!("warm-up report receiver dropped");
                }
            }
        }
        info!("warm-up stopped");
    }

    /// Spawn [`Warmup::run`] onto the runtime.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
