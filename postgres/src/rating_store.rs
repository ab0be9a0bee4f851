//! sqlx-backed [`RatingStore`].

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use asset_analytics_core::rating::{AnalysisContext, AssetRating};
use asset_analytics_core::store::{
    MAX_TOP_ASSETS, RatingQuery, RatingStore, StoreError, StoreFuture,
};
use asset_analytics_core::transaction::AssetType;

use crate::db_error;

const SELECT_COLUMNS: &str = "id, asset_id, asset_type, ticker, name, period_start, period_end, \
     buy_transaction_count, sell_transaction_count, total_buy_amount, total_sell_amount, \
     total_buy_quantity, total_sell_quantity, transaction_count_rank, transaction_amount_rank, \
     last_updated, context, portfolio_id";

/// `PostgreSQL` implementation of [`RatingStore`].
///
/// Upserts target the `asset_ratings_unique_key` constraint, so a rerun over
/// the same period updates rows in place instead of accumulating duplicates.
pub struct PgRatingStore {
    pool: PgPool,
}

impl PgRatingStore {
    /// Create a store over the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Shared shape of the four top-N queries; only the ordering differs.
    fn top_query(
        &self,
        query: RatingQuery,
        order_by: &'static str,
    ) -> StoreFuture<'_, Vec<AssetRating>> {
        Box::pin(async move {
            let sql = format!(
                r"
                SELECT {SELECT_COLUMNS}
                FROM asset_ratings
                WHERE period_start = $1 AND period_end = $2
                  AND context = $3
                  AND portfolio_id IS NOT DISTINCT FROM $4
                ORDER BY {order_by}
                LIMIT $5
                "
            );
            #[allow(clippy::cast_possible_wrap)] // Limit is clamped well below i64::MAX
            let limit = query.limit.min(MAX_TOP_ASSETS) as i64;
            let rows = sqlx::query(&sql)
                .bind(query.period.start())
                .bind(query.period.end())
                .bind(query.context.as_str())
                .bind(query.portfolio_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

            rows.iter().map(Self::row_to_rating).collect()
        })
    }

    fn row_to_rating(row: &PgRow) -> Result<AssetRating, StoreError> {
        let asset_type: String = row.try_get("asset_type").map_err(db_error)?;
        let asset_type = AssetType::parse(&asset_type)
            .ok_or_else(|| StoreError::InvalidRow(format!("unknown asset type '{asset_type}'")))?;
        let context: String = row.try_get("context").map_err(db_error)?;
        let context = AnalysisContext::parse(&context)
            .ok_or_else(|| StoreError::InvalidRow(format!("unknown context '{context}'")))?;

        let id: Uuid = row.try_get("id").map_err(db_error)?;
        let asset_id: Uuid = row.try_get("asset_id").map_err(db_error)?;
        let ticker: String = row.try_get("ticker").map_err(db_error)?;
        let name: String = row.try_get("name").map_err(db_error)?;
        let period_start: DateTime<Utc> = row.try_get("period_start").map_err(db_error)?;
        let period_end: DateTime<Utc> = row.try_get("period_end").map_err(db_error)?;
        let buy_count = read_count(row, "buy_transaction_count")?;
        let sell_count = read_count(row, "sell_transaction_count")?;
        let total_buy_amount: Decimal = row.try_get("total_buy_amount").map_err(db_error)?;
        let total_sell_amount: Decimal = row.try_get("total_sell_amount").map_err(db_error)?;
        let total_buy_quantity: i64 = row.try_get("total_buy_quantity").map_err(db_error)?;
        let total_sell_quantity: i64 = row.try_get("total_sell_quantity").map_err(db_error)?;
        let count_rank = read_count(row, "transaction_count_rank")?;
        let amount_rank = read_count(row, "transaction_amount_rank")?;
        let last_updated: DateTime<Utc> = row.try_get("last_updated").map_err(db_error)?;
        let portfolio_id: Option<Uuid> = row.try_get("portfolio_id").map_err(db_error)?;

        Ok(AssetRating::from_stored(
            id,
            asset_id,
            asset_type,
            ticker,
            name,
            period_start,
            period_end,
            buy_count,
            sell_count,
            total_buy_amount,
            total_sell_amount,
            total_buy_quantity,
            total_sell_quantity,
            count_rank,
            amount_rank,
            last_updated,
            context,
            portfolio_id,
        ))
    }
}

/// Counts and ranks are stored as BIGINT but bounded by u32 in the domain.
fn read_count(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let value: i64 = row.try_get(column).map_err(db_error)?;
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidRow(format!("{column} out of range: {value}")))
}

impl RatingStore for PgRatingStore {
    fn upsert_batch<'a>(&'a self, ratings: &'a [AssetRating]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if ratings.is_empty() {
                return Ok(());
            }

            // One database transaction per pass: either every rating lands or
            // none do.
            let mut tx = self.pool.begin().await.map_err(db_error)?;
            for rating in ratings {
                sqlx::query(
                    r"
                    INSERT INTO asset_ratings (
                        id, asset_id, asset_type, ticker, name,
                        period_start, period_end,
                        buy_transaction_count, sell_transaction_count,
                        total_buy_amount, total_sell_amount,
                        total_buy_quantity, total_sell_quantity,
                        transaction_count_rank, transaction_amount_rank,
                        last_updated, context, portfolio_id
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                              $12, $13, $14, $15, $16, $17, $18)
                    ON CONFLICT ON CONSTRAINT asset_ratings_unique_key DO UPDATE SET
                        asset_type = EXCLUDED.asset_type,
                        ticker = EXCLUDED.ticker,
                        name = EXCLUDED.name,
                        buy_transaction_count = EXCLUDED.buy_transaction_count,
                        sell_transaction_count = EXCLUDED.sell_transaction_count,
                        total_buy_amount = EXCLUDED.total_buy_amount,
                        total_sell_amount = EXCLUDED.total_sell_amount,
                        total_buy_quantity = EXCLUDED.total_buy_quantity,
                        total_sell_quantity = EXCLUDED.total_sell_quantity,
                        transaction_count_rank = EXCLUDED.transaction_count_rank,
                        transaction_amount_rank = EXCLUDED.transaction_amount_rank,
                        last_updated = EXCLUDED.last_updated
                    ",
                )
                .bind(rating.id())
                .bind(rating.asset_id())
                .bind(rating.asset_type().as_str())
                .bind(rating.ticker())
                .bind(rating.name())
                .bind(rating.period_start())
                .bind(rating.period_end())
                .bind(i64::from(rating.buy_transaction_count()))
                .bind(i64::from(rating.sell_transaction_count()))
                .bind(rating.total_buy_amount())
                .bind(rating.total_sell_amount())
                .bind(rating.total_buy_quantity())
                .bind(rating.total_sell_quantity())
                .bind(i64::from(rating.transaction_count_rank()))
                .bind(i64::from(rating.transaction_amount_rank()))
                .bind(rating.last_updated())
                .bind(rating.context().as_str())
                .bind(rating.portfolio_id())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            }
            tx.commit().await.map_err(db_error)?;

            counter!("analytics.store.ratings_upserted").increment(ratings.len() as u64);
            debug!(ratings = ratings.len(), "rating batch upserted");
            Ok(())
        })
    }

    fn top_by_transaction_count(
        &self,
        query: RatingQuery,
    ) -> StoreFuture<'_, Vec<AssetRating>> {
        self.top_query(
            query,
            "buy_transaction_count + sell_transaction_count DESC, asset_id ASC",
        )
    }

    fn top_by_transaction_amount(
        &self,
        query: RatingQuery,
    ) -> StoreFuture<'_, Vec<AssetRating>> {
        self.top_query(
            query,
            "total_buy_amount + total_sell_amount DESC, asset_id ASC",
        )
    }

    fn top_bought(&self, query: RatingQuery) -> StoreFuture<'_, Vec<AssetRating>> {
        self.top_query(
            query,
            "buy_transaction_count DESC, total_buy_amount DESC, asset_id ASC",
        )
    }

    fn top_sold(&self, query: RatingQuery) -> StoreFuture<'_, Vec<AssetRating>> {
        self.top_query(
            query,
            "sell_transaction_count DESC, total_sell_amount DESC, asset_id ASC",
        )
    }
}
