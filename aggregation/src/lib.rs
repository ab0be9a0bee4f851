//! # Asset Analytics Aggregation
//!
//! The aggregation orchestrator recomputes asset ratings for a period:
//!
//! 1. Load every transaction in the period. Nothing found means nothing to
//!    rate, and the run is a no-op.
//! 2. Global pass: group by asset, fold each group into a rating, rank the
//!    whole set, upsert it in one batch.
//! 3. Portfolio passes: one pass per portfolio that traded in the period,
//!    ranked and upserted independently of the global pass.
//!
//! A group that fails to fold is skipped with a warning, it never aborts the
//! run. Each upsert batch is atomic in the store, so a pass either lands
//! completely or leaves prior results untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use asset_analytics_core::period::Period;
use asset_analytics_core::ranking::RatingCalculator;
use asset_analytics_core::rating::{AnalysisContext, AssetRating};
use asset_analytics_core::store::{RatingStore, StoreError, TransactionStore};
use asset_analytics_core::transaction::AssetTransaction;

/// Errors raised by an aggregation run.
#[derive(Error, Debug, Clone)]
pub enum AggregationError {
    /// A store operation failed; partial results of completed passes remain.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Shutdown was requested between group computations or passes.
    #[error("aggregation cancelled by shutdown signal")]
    Cancelled,
}

/// Counters describing one aggregation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationOutcome {
    /// Ratings upserted by the global pass.
    pub global_ratings: usize,
    /// Number of portfolio passes executed.
    pub portfolio_passes: usize,
    /// Ratings upserted across all portfolio passes.
    pub portfolio_ratings: usize,
    /// Transaction groups that failed to fold and were skipped.
    pub skipped_groups: usize,
}

/// Orchestrates rating recomputation over the transaction and rating stores.
pub struct RatingAggregator {
    transactions: Arc<dyn TransactionStore>,
    ratings: Arc<dyn RatingStore>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl RatingAggregator {
    /// Create an aggregator over the given stores.
    #[must_use]
    pub fn new(transactions: Arc<dyn TransactionStore>, ratings: Arc<dyn RatingStore>) -> Self {
        Self {
            transactions,
            ratings,
            shutdown: None,
        }
    }

    /// Attach a shutdown signal checked before each group computation and
    /// between passes. An in-flight upsert is never interrupted.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Recompute all ratings for `period`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Store`] when a load or upsert fails and
    /// [`AggregationError::Cancelled`] when the shutdown signal fires between
    /// group computations or passes. Passes already upserted stay in place
    /// either way.
    pub async fn aggregate(&self, period: Period) -> Result<AggregationOutcome, AggregationError> {
        counter!("analytics.aggregation.runs").increment(1);
        info!(period = %period, "starting aggregation run");

        let all = self.transactions.find_by_period(period).await?;
        if all.is_empty() {
            info!(period = %period, "no transactions in period, nothing to aggregate");
            return Ok(AggregationOutcome::default());
        }

        let mut outcome = AggregationOutcome::default();

        let global =
            self.compute_pass(&all, period, AnalysisContext::Global, None, &mut outcome)?;
        outcome.global_ratings = global.len();
        self.upsert_pass(global).await?;
        debug!(
            ratings = outcome.global_ratings,
            "global pass complete"
        );

        for portfolio_id in Self::distinct_portfolios(&all) {
            self.check_shutdown()?;

            let scoped = self
                .transactions
                .find_by_portfolio_and_period(portfolio_id, period)
                .await?;
            if scoped.is_empty() {
                continue;
            }

            let pass = self.compute_pass(
                &scoped,
                period,
                AnalysisContext::Portfolio,
                Some(portfolio_id),
                &mut outcome,
            )?;
            outcome.portfolio_ratings += pass.len();
            outcome.portfolio_passes += 1;
            self.upsert_pass(pass).await?;
            debug!(portfolio_id = %portfolio_id, "portfolio pass complete");
        }

        info!(
            global = outcome.global_ratings,
            portfolios = outcome.portfolio_passes,
            skipped = outcome.skipped_groups,
            "aggregation run complete"
        );
        Ok(outcome)
    }

    /// Group by asset, fold each group, rank the resulting set. The shutdown
    /// signal is honoured before every group fold.
    fn compute_pass(
        &self,
        transactions: &[AssetTransaction],
        period: Period,
        context: AnalysisContext,
        portfolio_id: Option<Uuid>,
        outcome: &mut AggregationOutcome,
    ) -> Result<Vec<AssetRating>, AggregationError> {
        let mut ratings = Vec::new();
        for (asset_id, group) in Self::group_by_asset(transactions) {
            self.check_shutdown()?;
            let (ticker, name) = Self::asset_labels(asset_id);
            match RatingCalculator::compute_group_rating(
                &group,
                period,
                context,
                portfolio_id,
                group[0].asset_type(),
                &ticker,
                &name,
            ) {
                Ok(rating) => ratings.push(rating),
                Err(error) => {
                    counter!("analytics.aggregation.groups_skipped").increment(1);
                    warn!(
                        asset_id = %asset_id,
                        context = context.as_str(),
                        error = %error,
                        "skipping unratable transaction group"
                    );
                    outcome.skipped_groups += 1;
                }
            }
        }
        RatingCalculator::assign_ranks(&mut ratings);
        Ok(ratings)
    }

    async fn upsert_pass(&self, ratings: Vec<AssetRating>) -> Result<(), AggregationError> {
        if ratings.is_empty() {
            return Ok(());
        }
        self.ratings.upsert_batch(&ratings).await?;
        counter!("analytics.aggregation.ratings_upserted").increment(ratings.len() as u64);
        Ok(())
    }

    /// `BTreeMap` keeps group iteration order stable across runs.
    fn group_by_asset(
        transactions: &[AssetTransaction],
    ) -> BTreeMap<Uuid, Vec<AssetTransaction>> {
        let mut groups: BTreeMap<Uuid, Vec<AssetTransaction>> = BTreeMap::new();
        for transaction in transactions {
            groups
                .entry(transaction.asset_id())
                .or_default()
                .push(transaction.clone());
        }
        groups
    }

    fn distinct_portfolios(transactions: &[AssetTransaction]) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = transactions.iter().map(AssetTransaction::portfolio_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Placeholder descriptive data until a reference-data source is wired in.
    fn asset_labels(asset_id: Uuid) -> (String, String) {
        (
            format!("STOCK_{}", asset_id.simple()),
            format!("Asset {asset_id}"),
        )
    }

    fn check_shutdown(&self) -> Result<(), AggregationError> {
        if let Some(shutdown) = &self.shutdown {
            if *shutdown.borrow() {
                info!("shutdown requested, stopping aggregation");
                return Err(AggregationError::Cancelled);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use asset_analytics_core::store::RatingQuery;
    use asset_analytics_core::transaction::AssetType;
    use asset_analytics_testing::{InMemoryRatingStore, InMemoryTransactionStore};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn period() -> Period {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        Period::custom(start, end).unwrap()
    }

    fn trade(portfolio: Uuid, asset: Uuid, quantity: i32, price: i64) -> AssetTransaction {
        AssetTransaction::buy(
            portfolio,
            asset,
            AssetType::Share,
            quantity,
            Decimal::from(price),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            "USD",
            None,
        )
        .unwrap()
    }

    fn aggregator(
        transactions: &InMemoryTransactionStore,
        ratings: &InMemoryRatingStore,
    ) -> RatingAggregator {
        RatingAggregator::new(Arc::new(transactions.clone()), Arc::new(ratings.clone()))
    }

    #[tokio::test]
    async fn empty_period_is_a_no_op() {
        let transactions = InMemoryTransactionStore::new();
        let ratings = InMemoryRatingStore::new();

        let outcome = aggregator(&transactions, &ratings)
            .aggregate(period())
            .await
            .unwrap();

        assert_eq!(outcome, AggregationOutcome::default());
        assert!(ratings.is_empty());
    }

    #[tokio::test]
    async fn global_pass_ranks_every_asset() {
        asset_analytics_testing::init_test_tracing();
        let transactions = InMemoryTransactionStore::new();
        let ratings = InMemoryRatingStore::new();
        let portfolio = Uuid::new_v4();
        let busy = Uuid::new_v4();
        let quiet = Uuid::new_v4();

        for _ in 0..3 {
            transactions.seed([trade(portfolio, busy, 1, 10)]);
        }
        transactions.seed([trade(portfolio, quiet, 1, 10)]);

        let outcome = aggregator(&transactions, &ratings)
            .aggregate(period())
            .await
            .unwrap();
        assert_eq!(outcome.global_ratings, 2);

        let top = ratings
            .top_by_transaction_count(RatingQuery::global(period()))
            .await
            .unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].asset_id(), busy);
        assert_eq!(top[0].transaction_count_rank(), 1);
        assert_eq!(top[1].asset_id(), quiet);
        assert_eq!(top[1].transaction_count_rank(), 2);
        assert!(top.iter().all(AssetRating::is_ranked));
    }

    #[tokio::test]
    async fn portfolio_passes_are_scoped_and_independent() {
        let transactions = InMemoryTransactionStore::new();
        let ratings = InMemoryRatingStore::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let asset = Uuid::new_v4();

        transactions.seed([
            trade(alice, asset, 1, 10),
            trade(alice, asset, 2, 10),
            trade(bob, asset, 5, 10),
        ]);

        let outcome = aggregator(&transactions, &ratings)
            .aggregate(period())
            .await
            .unwrap();
        assert_eq!(outcome.portfolio_passes, 2);
        assert_eq!(outcome.portfolio_ratings, 2);

        let alice_top = ratings
            .top_by_transaction_count(RatingQuery::portfolio(alice, period()))
            .await
            .unwrap();
        assert_eq!(alice_top.len(), 1);
        assert_eq!(alice_top[0].buy_transaction_count(), 2);
        assert_eq!(alice_top[0].portfolio_id(), Some(alice));

        let bob_top = ratings
            .top_by_transaction_count(RatingQuery::portfolio(bob, period()))
            .await
            .unwrap();
        assert_eq!(bob_top[0].buy_transaction_count(), 1);
        assert_eq!(bob_top[0].total_buy_amount(), Decimal::from(50));
    }

    #[tokio::test]
    async fn rerun_is_idempotent_on_rating_count() {
        let transactions = InMemoryTransactionStore::new();
        let ratings = InMemoryRatingStore::new();
        let portfolio = Uuid::new_v4();
        transactions.seed([trade(portfolio, Uuid::new_v4(), 1, 10)]);

        let aggregator = aggregator(&transactions, &ratings);
        aggregator.aggregate(period()).await.unwrap();
        let after_first = ratings.len();
        aggregator.aggregate(period()).await.unwrap();

        // Global + one portfolio rating, same unique keys both times.
        assert_eq!(after_first, 2);
        assert_eq!(ratings.len(), after_first);
    }

    #[tokio::test]
    async fn transactions_outside_the_period_are_ignored() {
        let transactions = InMemoryTransactionStore::new();
        let ratings = InMemoryRatingStore::new();
        let portfolio = Uuid::new_v4();

        let outside = AssetTransaction::buy(
            portfolio,
            Uuid::new_v4(),
            AssetType::Share,
            1,
            Decimal::ONE,
            Utc.with_ymd_and_hms(2025, 5, 20, 12, 0, 0).unwrap(),
            "USD",
            None,
        )
        .unwrap();
        transactions.seed([outside]);

        let outcome = aggregator(&transactions, &ratings)
            .aggregate(period())
            .await
            .unwrap();
        assert_eq!(outcome, AggregationOutcome::default());
    }

    #[tokio::test]
    async fn failed_upsert_surfaces_and_writes_nothing() {
        let transactions = InMemoryTransactionStore::new();
        let ratings = InMemoryRatingStore::new();
        transactions.seed([trade(Uuid::new_v4(), Uuid::new_v4(), 1, 10)]);
        ratings.fail_upserts(true);

        let result = aggregator(&transactions, &ratings).aggregate(period()).await;
        assert!(matches!(result, Err(AggregationError::Store(_))));
        assert!(ratings.is_empty());
    }

    #[tokio::test]
    async fn shutdown_signal_cancels_before_any_write() {
        let transactions = InMemoryTransactionStore::new();
        let ratings = InMemoryRatingStore::new();
        transactions.seed([trade(Uuid::new_v4(), Uuid::new_v4(), 1, 10)]);

        let (tx, rx) = watch::channel(true);
        let aggregator = aggregator(&transactions, &ratings).with_shutdown(rx);

        let result = aggregator.aggregate(period()).await;
        assert!(matches!(result, Err(AggregationError::Cancelled)));
        // The check runs before the first group fold, so the global pass
        // never reaches its upsert.
        assert!(ratings.is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn unsignalled_shutdown_lets_the_run_complete() {
        let transactions = InMemoryTransactionStore::new();
        let ratings = InMemoryRatingStore::new();
        let portfolio = Uuid::new_v4();
        transactions.seed([trade(portfolio, Uuid::new_v4(), 1, 10)]);

        let (tx, rx) = watch::channel(false);
        let aggregator = aggregator(&transactions, &ratings).with_shutdown(rx);

        let outcome = aggregator.aggregate(period()).await.unwrap();
        assert_eq!(outcome.global_ratings, 1);
        assert_eq!(outcome.portfolio_passes, 1);
        assert_eq!(ratings.len(), 2);
        drop(tx);
    }
}
