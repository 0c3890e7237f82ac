//! Tracing subscriber setup

use gantry_config::LoggingConfig;
use gantry_core::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter for `logging`
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn env_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    let level = logging.tracing_level()?;
    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())))
}

/// Install the global tracing subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = env_filter(logging)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match logging.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        _ => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true),
            )
            .try_init(),
    };

    result.map_err(|e| Error::Runtime(format!("Failed to initialize tracing: {e}")))
}
