//! Builds the adapter registry from configured sources.

use std::time::Duration;

use procura_search::{
    AdapterRegistry, FixtureAdapter, HttpSession, RetryConfig, Retrying, SelectorAdapter, SourceId,
};

use crate::config::{ProcuraConfig, SourceConfig, SourceKind};
use crate::error::Result;

/// Register every enabled source, each wrapped in the engine's retry policy.
///
/// # Errors
///
/// Returns an error for an invalid selector spec, an unreadable fixture,
/// or a duplicate source id.
pub fn build_registry(config: &ProcuraConfig) -> Result<AdapterRegistry<HttpSession>> {
    let mut registry = AdapterRegistry::new();
    for source in config.enabled_sources() {
        register(&mut registry, source, &config.engine.retry)?;
    }
    tracing::info!(
        sources = registry.len(),
        disabled = config.sources.len() - registry.len(),
        "source registry built"
    );
    Ok(registry)
}

fn register(
    registry: &mut AdapterRegistry<HttpSession>,
    source: &SourceConfig,
    retry: &RetryConfig,
) -> Result<()> {
    let id = SourceId::new(source.id.as_str());
    match &source.kind {
        SourceKind::Selector(spec) => {
            let adapter = SelectorAdapter::new(id, spec)?;
            registry.register(Retrying::new(adapter, retry))?;
        }
        SourceKind::Fixture { path, delay_ms } => {
            let adapter = FixtureAdapter::from_file(id, path)?
                .with_delay(Duration::from_millis(*delay_ms));
            tracing::debug!(source = %source.id, listings = adapter.len(), "fixture loaded");
            registry.register(Retrying::new(adapter, retry))?;
        }
    }
    Ok(())
}
