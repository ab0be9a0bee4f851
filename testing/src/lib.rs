//! # Asset Analytics Testing
//!
//! Fast, deterministic in-memory test doubles for the analytics pipeline:
//!
//! - [`InMemoryTransactionStore`]: `Vec`-backed transaction storage with
//!   per-asset failure injection
//! - [`InMemoryRatingStore`]: `HashMap`-backed rating storage keyed by the
//!   rating unique key, with upsert-failure injection
//! - [`RecordingEventPublisher`]: captures published events for assertions
//!
//! These complement the production implementations in
//! `asset-analytics-postgres` and `asset-analytics-kafka` and are used by the
//! aggregation and batch-consumer test suites.

pub mod events;
pub mod stores;

pub use events::RecordingEventPublisher;
pub use stores::{InMemoryRatingStore, InMemoryTransactionStore};

/// Install a compact `tracing` subscriber for test output.
///
/// Safe to call from multiple tests; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .compact()
        .try_init();
}
