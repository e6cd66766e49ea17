//! Tracing subscriber setup.

use crate::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Returns `false` if
/// a subscriber was already installed, which makes repeated calls harmless.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match config.format() {
        LogFormat::Plain => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::debug!(format = %config.format(), "Tracing initialized");
    }
    installed
}
