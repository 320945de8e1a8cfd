//! Logging setup for a Hexis server process.

use hexis_core::config::{GeneralConfig, LogFormat};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Returns `false` if a
/// subscriber was already installed (tests, embedding servers).
pub fn init(config: &GeneralConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.log_format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    };
    installed.is_ok()
}
