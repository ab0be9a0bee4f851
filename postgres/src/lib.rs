//! # Asset Analytics Postgres
//!
//! `PostgreSQL` implementations of the storage traits from
//! `asset-analytics-core`, built on sqlx:
//!
//! - [`PgTransactionStore`]: append-only transaction persistence with the
//!   half-open period queries the aggregator needs
//! - [`PgRatingStore`]: atomic per-pass rating upserts and the top-N read
//!   queries
//!
//! Schema migrations are embedded and applied with [`migrate`].

pub mod rating_store;
pub mod transaction_store;

pub use rating_store::PgRatingStore;
pub use transaction_store::PgTransactionStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use asset_analytics_core::store::StoreError;

/// Connect a pooled client to the given database url.
///
/// # Errors
///
/// Returns [`StoreError::Database`] when the connection fails.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
}

/// Apply the embedded schema migrations.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] when a migration fails to apply.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))
}

pub(crate) fn db_error(error: sqlx::Error) -> StoreError {
    StoreError::Database(error.to_string())
}
