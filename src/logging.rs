//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays free for results. `RUST_LOG`
//! overrides the configured filter. With a log directory configured, the
//! same events are also written to a daily rolling file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::LoggingConfig;
use crate::error::{ProcuraError, Result};

/// Keeps the background file writer alive. Drop it only at shutdown, or
/// buffered lines are lost.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Filter from `RUST_LOG`, falling back to `directives`.
///
/// # Errors
///
/// Returns [`ProcuraError::Logging`] if neither is a valid filter.
pub fn build_filter(directives: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directives)
        .map_err(|e| ProcuraError::Logging(format!("invalid log filter {directives:?}: {e}")))
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`ProcuraError::Logging`] for an invalid filter or if a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = build_filter(&config.filter)?;

    let stderr_layer = if config.json {
        fmt::layer().with_writer(std::io::stderr).json().boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    };

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ProcuraError::Logging(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}
