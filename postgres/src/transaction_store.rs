//! sqlx-backed [`TransactionStore`].

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use asset_analytics_core::period::Period;
use asset_analytics_core::store::{StoreError, StoreFuture, TransactionStore};
use asset_analytics_core::transaction::{AssetTransaction, AssetType, TransactionKind};

use crate::db_error;

const SELECT_COLUMNS: &str = "id, portfolio_id, asset_id, asset_type, kind, quantity, \
     price_per_unit, total_amount, transaction_time, currency, metadata";

/// `PostgreSQL` implementation of [`TransactionStore`].
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    /// Create a store over the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_transaction(row: &PgRow) -> Result<AssetTransaction, StoreError> {
        let asset_type: String = row.try_get("asset_type").map_err(db_error)?;
        let asset_type = AssetType::parse(&asset_type)
            .ok_or_else(|| StoreError::InvalidRow(format!("unknown asset type '{asset_type}'")))?;
        let kind: String = row.try_get("kind").map_err(db_error)?;
        let kind = TransactionKind::parse(&kind)
            .ok_or_else(|| StoreError::InvalidRow(format!("unknown transaction kind '{kind}'")))?;

        let id: Uuid = row.try_get("id").map_err(db_error)?;
        let portfolio_id: Uuid = row.try_get("portfolio_id").map_err(db_error)?;
        let asset_id: Uuid = row.try_get("asset_id").map_err(db_error)?;
        let quantity: i32 = row.try_get("quantity").map_err(db_error)?;
        let price_per_unit: Decimal = row.try_get("price_per_unit").map_err(db_error)?;
        let total_amount: Decimal = row.try_get("total_amount").map_err(db_error)?;
        let transaction_time: DateTime<Utc> = row.try_get("transaction_time").map_err(db_error)?;
        let currency: String = row.try_get("currency").map_err(db_error)?;
        let metadata: Option<String> = row.try_get("metadata").map_err(db_error)?;

        Ok(AssetTransaction::from_stored(
            id,
            portfolio_id,
            asset_id,
            asset_type,
            kind,
            quantity,
            price_per_unit,
            total_amount,
            transaction_time,
            currency,
            metadata,
        ))
    }
}

impl TransactionStore for PgTransactionStore {
    fn insert<'a>(&'a self, transaction: &'a AssetTransaction) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO asset_transactions (
                    id, portfolio_id, asset_id, asset_type, kind, quantity,
                    price_per_unit, total_amount, transaction_time, currency, metadata
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ",
            )
            .bind(transaction.id())
            .bind(transaction.portfolio_id())
            .bind(transaction.asset_id())
            .bind(transaction.asset_type().as_str())
            .bind(transaction.kind().as_str())
            .bind(transaction.quantity())
            .bind(transaction.price_per_unit())
            .bind(transaction.total_amount())
            .bind(transaction.transaction_time())
            .bind(transaction.currency())
            .bind(transaction.metadata())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

            counter!("analytics.store.transactions_inserted").increment(1);
            debug!(
                transaction_id = %transaction.id(),
                asset_id = %transaction.asset_id(),
                "transaction persisted"
            );
            Ok(())
        })
    }

    fn find_by_period(&self, period: Period) -> StoreFuture<'_, Vec<AssetTransaction>> {
        Box::pin(async move {
            let sql = format!(
                r"
                SELECT {SELECT_COLUMNS}
                FROM asset_transactions
                WHERE transaction_time >= $1 AND transaction_time < $2
                ORDER BY transaction_time ASC
                "
            );
            let rows = sqlx::query(&sql)
                .bind(period.start())
                .bind(period.end())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

            rows.iter().map(Self::row_to_transaction).collect()
        })
    }

    fn find_by_portfolio_and_period(
        &self,
        portfolio_id: Uuid,
        period: Period,
    ) -> StoreFuture<'_, Vec<AssetTransaction>> {
        Box::pin(async move {
            let sql = format!(
                r"
                SELECT {SELECT_COLUMNS}
                FROM asset_transactions
                WHERE portfolio_id = $1
                  AND transaction_time >= $2 AND transaction_time < $3
                ORDER BY transaction_time ASC
                "
            );
            let rows = sqlx::query(&sql)
                .bind(portfolio_id)
                .bind(period.start())
                .bind(period.end())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

            rows.iter().map(Self::row_to_transaction).collect()
        })
    }
}
