//! Multi-camera recorder - continuous recording from several cameras at once.
//!
//! This is the library crate behind the `multicam-recorder` binary. It
//! provides camera capture, per-camera recording workers with time-based
//! segment rotation, and lossy live previews.

pub mod capture;
pub mod commands;
pub mod config;
pub mod encoder;
pub mod recorder;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multicam_recorder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
