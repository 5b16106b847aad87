//! Test infrastructure for the bridge forwarding engine
//!
//! Provides:
//! - Recording egress and scripted hardware table collaborators
//! - Allocators that fail on demand
//! - Port and frame fixtures, including payloads that count releases

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
pub use sonic_bridge::ManualClock;

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Installs a test log writer once per process. Honors `RUST_LOG`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
