//! Diagnostic log setup for the `lockwarden` binary.

use crate::error::{Result, WardenError};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber, writing human-readable lines to stderr.
///
/// `RUST_LOG` takes precedence; `level` is the fallback filter. Calling this
/// twice leaves the first subscriber in place.
pub fn init(level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| WardenError::ConfigError(format!("invalid log filter '{}': {}", level, e)))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        tracing::debug!("log subscriber already installed: {}", e);
    }
    Ok(())
}
