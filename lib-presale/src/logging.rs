//! Tracing setup

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins when set; otherwise `level` (e.g. "info",
/// "lib_presale=debug") is used. Fails if a subscriber is already installed.
pub fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", level, e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
