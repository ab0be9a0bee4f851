//! In-memory store implementations.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on lock acquisition

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use asset_analytics_core::period::Period;
use asset_analytics_core::rating::{AnalysisContext, AssetRating, RatingKey};
use asset_analytics_core::store::{
    RatingQuery, RatingStore, StoreError, StoreFuture, TransactionStore, MAX_TOP_ASSETS,
};
use asset_analytics_core::transaction::AssetTransaction;

/// In-memory [`TransactionStore`] for tests.
///
/// Inserts for asset ids registered via [`fail_asset`](Self::fail_asset)
/// return a database error, which lets tests drive the per-message
/// persistence-failure path of the batch consumer.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<Vec<AssetTransaction>>>,
    failing_assets: Arc<RwLock<HashSet<Uuid>>>,
}

impl InMemoryTransactionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert for `asset_id` fail.
    pub fn fail_asset(&self, asset_id: Uuid) {
        self.failing_assets.write().unwrap().insert(asset_id);
    }

    /// Number of stored transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.read().unwrap().is_empty()
    }

    /// Snapshot of all stored transactions.
    #[must_use]
    pub fn all(&self) -> Vec<AssetTransaction> {
        self.transactions.read().unwrap().clone()
    }

    /// Seed the store directly, bypassing the insert path.
    pub fn seed(&self, transactions: impl IntoIterator<Item = AssetTransaction>) {
        self.transactions.write().unwrap().extend(transactions);
    }

    /// Clear all data and failure injections (for test isolation).
    pub fn clear(&self) {
        self.transactions.write().unwrap().clear();
        self.failing_assets.write().unwrap().clear();
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn insert<'a>(&'a self, transaction: &'a AssetTransaction) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self
                .failing_assets
                .read()
                .unwrap()
                .contains(&transaction.asset_id())
            {
                return Err(StoreError::Database(format!(
                    "injected insert failure for asset {}",
                    transaction.asset_id()
                )));
            }
            self.transactions.write().unwrap().push(transaction.clone());
            Ok(())
        })
    }

    fn find_by_period(&self, period: Period) -> StoreFuture<'_, Vec<AssetTransaction>> {
        Box::pin(async move {
            Ok(self
                .transactions
                .read()
                .unwrap()
                .iter()
                .filter(|t| period.contains(t.transaction_time()))
                .cloned()
                .collect())
        })
    }

    fn find_by_portfolio_and_period(
        &self,
        portfolio_id: Uuid,
        period: Period,
    ) -> StoreFuture<'_, Vec<AssetTransaction>> {
        Box::pin(async move {
            Ok(self
                .transactions
                .read()
                .unwrap()
                .iter()
                .filter(|t| {
                    t.portfolio_id() == portfolio_id && period.contains(t.transaction_time())
                })
                .cloned()
                .collect())
        })
    }
}

/// In-memory [`RatingStore`] for tests, keyed by [`RatingKey`].
///
/// Upserts are all-or-nothing like the Postgres implementation: when failure
/// injection is armed the whole batch is rejected and nothing changes.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRatingStore {
    ratings: Arc<RwLock<HashMap<RatingKey, AssetRating>>>,
    fail_upserts: Arc<RwLock<bool>>,
}

impl InMemoryRatingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm or disarm upsert failure injection.
    pub fn fail_upserts(&self, fail: bool) {
        *self.fail_upserts.write().unwrap() = fail;
    }

    /// Number of stored ratings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ratings.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ratings.read().unwrap().is_empty()
    }

    /// Snapshot of all stored ratings.
    #[must_use]
    pub fn all(&self) -> Vec<AssetRating> {
        self.ratings.read().unwrap().values().cloned().collect()
    }

    /// Look up one rating by its unique key.
    #[must_use]
    pub fn get(&self, key: &RatingKey) -> Option<AssetRating> {
        self.ratings.read().unwrap().get(key).cloned()
    }

    /// Clear all data and failure injections (for test isolation).
    pub fn clear(&self) {
        self.ratings.write().unwrap().clear();
        *self.fail_upserts.write().unwrap() = false;
    }

    fn matches(rating: &AssetRating, query: &RatingQuery) -> bool {
        rating.period_start() == query.period.start()
            && rating.period_end() == query.period.end()
            && rating.context() == query.context
            && match query.context {
                AnalysisContext::Global => rating.portfolio_id().is_none(),
                AnalysisContext::Portfolio => rating.portfolio_id() == query.portfolio_id,
            }
    }

    fn top_by<K, F>(&self, query: RatingQuery, key: F) -> Vec<AssetRating>
    where
        K: Ord,
        F: Fn(&AssetRating) -> K,
    {
        let mut rows: Vec<AssetRating> = self
            .ratings
            .read()
            .unwrap()
            .values()
            .filter(|r| Self::matches(r, &query))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (key(r), r.asset_id()));
        rows.truncate(query.limit.min(MAX_TOP_ASSETS));
        rows
    }
}

impl RatingStore for InMemoryRatingStore {
    fn upsert_batch<'a>(&'a self, ratings: &'a [AssetRating]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if *self.fail_upserts.read().unwrap() {
                return Err(StoreError::Database(
                    "injected upsert failure".to_string(),
                ));
            }
            let mut map = self.ratings.write().unwrap();
            for rating in ratings {
                map.insert(rating.key(), rating.clone());
            }
            Ok(())
        })
    }

    fn top_by_transaction_count(
        &self,
        query: RatingQuery,
    ) -> StoreFuture<'_, Vec<AssetRating>> {
        Box::pin(async move {
            Ok(self.top_by(query, |r| std::cmp::Reverse(r.transaction_count_total())))
        })
    }

    fn top_by_transaction_amount(
        &self,
        query: RatingQuery,
    ) -> StoreFuture<'_, Vec<AssetRating>> {
        Box::pin(async move {
            Ok(self.top_by(query, |r| std::cmp::Reverse(r.transaction_amount_total())))
        })
    }

    fn top_bought(&self, query: RatingQuery) -> StoreFuture<'_, Vec<AssetRating>> {
        Box::pin(async move {
            Ok(self.top_by(query, |r| {
                (
                    std::cmp::Reverse(r.buy_transaction_count()),
                    std::cmp::Reverse(r.total_buy_amount()),
                )
            }))
        })
    }

    fn top_sold(&self, query: RatingQuery) -> StoreFuture<'_, Vec<AssetRating>> {
        Box::pin(async move {
            Ok(self.top_by(query, |r| {
                (
                    std::cmp::Reverse(r.sell_transaction_count()),
                    std::cmp::Reverse(r.total_sell_amount()),
                )
            }))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use asset_analytics_core::transaction::AssetType;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn insert_failure_injection_is_per_asset() {
        let store = InMemoryTransactionStore::new();
        let poisoned = Uuid::new_v4();
        store.fail_asset(poisoned);

        let good = AssetTransaction::buy(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AssetType::Share,
            1,
            Decimal::ONE,
            Utc::now() - Duration::minutes(1),
            "USD",
            None,
        )
        .unwrap();
        let bad = AssetTransaction::buy(
            Uuid::new_v4(),
            poisoned,
            AssetType::Share,
            1,
            Decimal::ONE,
            Utc::now() - Duration::minutes(1),
            "USD",
            None,
        )
        .unwrap();

        assert!(store.insert(&good).await.is_ok());
        assert!(store.insert(&bad).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_upsert_leaves_store_unchanged() {
        let store = InMemoryRatingStore::new();
        let period = Period::custom(Utc::now() - Duration::days(1), Utc::now()).unwrap();
        let rating =
            AssetRating::global(Uuid::new_v4(), AssetType::Share, "T", "T", period).unwrap();

        store.fail_upserts(true);
        assert!(store.upsert_batch(&[rating.clone()]).await.is_err());
        assert!(store.is_empty());

        store.fail_upserts(false);
        store.upsert_batch(&[rating]).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
