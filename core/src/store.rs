//! Persistence traits at the edge of the domain.
//!
//! The domain talks to storage exclusively through [`TransactionStore`] and
//! [`RatingStore`]. Both traits use explicit `Pin<Box<dyn Future>>` returns
//! instead of `async fn` so they remain dyn-compatible: the consumer and the
//! aggregation orchestrator hold them as `Arc<dyn ...>`.
//!
//! Implementations live in `asset-analytics-postgres` (production) and
//! `asset-analytics-testing` (in-memory fakes).

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use uuid::Uuid;

use crate::period::Period;
use crate::rating::{AnalysisContext, AssetRating};
use crate::transaction::AssetTransaction;

/// Hard cap on `limit` for top-N rating queries.
pub const MAX_TOP_ASSETS: usize = 100;

/// Default `limit` for top-N rating queries.
pub const DEFAULT_TOP_ASSETS: usize = 10;

/// Boxed future returned by store trait methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors surfaced by store implementations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The underlying database rejected the operation.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be decoded into a domain value.
    #[error("invalid stored row: {0}")]
    InvalidRow(String),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(String),
}

/// Filter for the rating read queries (spec'd downstream reporting surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingQuery {
    /// Maximum rows to return; implementations clamp to [`MAX_TOP_ASSETS`].
    pub limit: usize,
    /// Period the ratings were aggregated over.
    pub period: Period,
    /// Scope discriminator.
    pub context: AnalysisContext,
    /// Required for [`AnalysisContext::Portfolio`], ignored for Global.
    pub portfolio_id: Option<Uuid>,
}

impl RatingQuery {
    /// Query the global context with the default limit.
    #[must_use]
    pub const fn global(period: Period) -> Self {
        Self {
            limit: DEFAULT_TOP_ASSETS,
            period,
            context: AnalysisContext::Global,
            portfolio_id: None,
        }
    }

    /// Query a single portfolio with the default limit.
    #[must_use]
    pub const fn portfolio(portfolio_id: Uuid, period: Period) -> Self {
        Self {
            limit: DEFAULT_TOP_ASSETS,
            period,
            context: AnalysisContext::Portfolio,
            portfolio_id: Some(portfolio_id),
        }
    }

    /// Override the row limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Durable storage for ingested transactions.
///
/// Transactions are append-only: there is no update operation by design.
pub trait TransactionStore: Send + Sync {
    /// Persist one transaction.
    fn insert<'a>(&'a self, transaction: &'a AssetTransaction) -> StoreFuture<'a, ()>;

    /// All transactions with `transaction_time` in `[start, end)` of `period`.
    fn find_by_period(&self, period: Period) -> StoreFuture<'_, Vec<AssetTransaction>>;

    /// One portfolio's transactions within `period`.
    fn find_by_portfolio_and_period(
        &self,
        portfolio_id: Uuid,
        period: Period,
    ) -> StoreFuture<'_, Vec<AssetTransaction>>;
}

/// Durable storage for computed ratings.
pub trait RatingStore: Send + Sync {
    /// Insert or update every rating by its unique key, atomically.
    ///
    /// The whole batch is applied inside a single database transaction: on
    /// any failure nothing is written and the error is surfaced to the
    /// caller.
    fn upsert_batch<'a>(&'a self, ratings: &'a [AssetRating]) -> StoreFuture<'a, ()>;

    /// Top ratings by total transaction count, ordering matching
    /// `transaction_count_rank` (descending count, ascending asset id).
    fn top_by_transaction_count(&self, query: RatingQuery)
        -> StoreFuture<'_, Vec<AssetRating>>;

    /// Top ratings by total transaction amount, ordering matching
    /// `transaction_amount_rank` (descending amount, ascending asset id).
    fn top_by_transaction_amount(
        &self,
        query: RatingQuery,
    ) -> StoreFuture<'_, Vec<AssetRating>>;

    /// Most-bought assets: descending buy count, then buy amount, then
    /// ascending asset id.
    fn top_bought(&self, query: RatingQuery) -> StoreFuture<'_, Vec<AssetRating>>;

    /// Most-sold assets: descending sell count, then sell amount, then
    /// ascending asset id.
    fn top_sold(&self, query: RatingQuery) -> StoreFuture<'_, Vec<AssetRating>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn rating_query_builders() {
        let period = Period::custom(Utc::now() - Duration::days(1), Utc::now()).unwrap();

        let query = RatingQuery::global(period).with_limit(25);
        assert_eq!(query.limit, 25);
        assert_eq!(query.context, AnalysisContext::Global);
        assert_eq!(query.portfolio_id, None);

        let portfolio = Uuid::new_v4();
        let query = RatingQuery::portfolio(portfolio, period);
        assert_eq!(query.limit, DEFAULT_TOP_ASSETS);
        assert_eq!(query.portfolio_id, Some(portfolio));
    }
}
