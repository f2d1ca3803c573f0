//! Procura: product search across supplier catalogues.
//!
//! This crate is the host around [`procura_search`]: it loads the TOML
//! configuration, sets up logging, builds the catalogue adapters, and runs
//! the periodic cache warm-up. The `procura` binary exposes it on the
//! command line.

pub mod config;
pub mod error;
pub mod logging;
pub mod sources;
pub mod warmup;

use std::sync::Arc;

use procura_search::{HttpSessionBackend, Lexicon, SearchService};

pub use config::{LoggingConfig, ProcuraConfig, SourceConfig, SourceKind, WarmupConfig};
pub use error::{ProcuraError, Result};
pub use logging::{LoggingGuard, init_tracing};
pub use sources::build_registry;
pub use warmup::{Warmup, WarmupReport};

/// Validate `config` and start a search service over its sources.
///
/// # Errors
///
/// Returns an error for invalid configuration, an adapter or morphology
/// dictionary that cannot be loaded, or sessions that cannot be created.
pub async fn build_service(config: &ProcuraConfig) -> Result<SearchService<HttpSessionBackend>> {
    config.validate()?;
    let registry = build_registry(config)?;
    let lexicon_config = config.lexicon.clone();
    let lexicon = tokio::task::spawn_blocking(move || Lexicon::from_config(&lexicon_config))
        .await
        .map_err(|e| ProcuraError::Config(format!("lexicon loading failed: {e}")))??;
    let lexicon = Arc::new(lexicon);
    let service = SearchService::from_config(
        HttpSessionBackend::new(config.http.clone()),
        registry,
        config.engine.clone(),
        lexicon,
    )
    .await?;
    Ok(service)
}
