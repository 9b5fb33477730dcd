//! Logging bootstrap
//!
//! Library code only emits `tracing` events; the embedding process decides
//! whether to install this subscriber.

use crate::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_level` when set. Fails (instead of
/// panicking) if a global subscriber is already installed.
pub fn init_logging(default_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to install logger: {}", e)))
}
