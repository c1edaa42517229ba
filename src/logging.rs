//! Subscriber setup
//!
//! Composes the global `tracing` subscriber: an env filter, human-readable
//! output on stderr, and a [`BridgeLayer`](crate::BridgeLayer) so that
//! application events reach the sink as well.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::intercept::Bridge;

/// Filter used when `RUST_LOG` is unset or invalid
const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Install the global subscriber
///
/// # Panics
/// If a global subscriber has already been set; use [`try_init`] to handle that case.
pub fn init(bridge: &Bridge) {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(bridge.layer())
        .init();
}

/// Install the global subscriber, failing if one is already set
pub fn try_init(bridge: &Bridge) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(bridge.layer())
        .try_init()
        .context("Failed to install global tracing subscriber")
}
