//! Domain events published after successful ingestion.
//!
//! The batch consumer publishes one [`TransactionReceived`] per persisted
//! transaction. Delivery is at-least-once and best-effort relative to the
//! already-durable transaction: a publish failure is logged, never undone.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::transaction::{AssetTransaction, AssetType, TransactionKind};

/// Errors raised when publishing a domain event.
#[derive(Error, Debug, Clone)]
pub enum EventPublishError {
    /// The event could not be serialized for the wire.
    #[error("event serialization failed: {0}")]
    SerializationFailed(String),

    /// The transport rejected the publish.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// Destination topic.
        topic: String,
        /// Transport-level reason.
        reason: String,
    },
}

/// Fact that a transaction was ingested and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceived {
    /// Identifier of the persisted transaction record.
    pub transaction_id: Uuid,
    /// Owning portfolio.
    pub portfolio_id: Uuid,
    /// Traded asset.
    pub asset_id: Uuid,
    /// Kind of asset.
    pub asset_type: AssetType,
    /// Buy or sell.
    pub kind: TransactionKind,
    /// Units traded.
    pub quantity: i32,
    /// Unit price.
    pub price_per_unit: Decimal,
    /// Derived total.
    pub total_amount: Decimal,
    /// When the trade happened.
    pub transaction_time: DateTime<Utc>,
    /// Currency code.
    pub currency: String,
    /// When the event was emitted.
    pub received_at: DateTime<Utc>,
}

impl TransactionReceived {
    /// Build the event for a freshly persisted transaction.
    #[must_use]
    pub fn from_transaction(transaction: &AssetTransaction) -> Self {
        Self {
            transaction_id: transaction.id(),
            portfolio_id: transaction.portfolio_id(),
            asset_id: transaction.asset_id(),
            asset_type: transaction.asset_type(),
            kind: transaction.kind(),
            quantity: transaction.quantity(),
            price_per_unit: transaction.price_per_unit(),
            total_amount: transaction.total_amount(),
            transaction_time: transaction.transaction_time(),
            currency: transaction.currency().to_string(),
            received_at: Utc::now(),
        }
    }
}

/// Publisher for [`TransactionReceived`] events.
///
/// Uses an explicit boxed-future return for dyn compatibility
/// (`Arc<dyn EventPublisher>` in the batch consumer).
pub trait EventPublisher: Send + Sync {
    /// Publish one event.
    fn publish<'a>(
        &'a self,
        event: &'a TransactionReceived,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventPublishError>> + Send + 'a>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn event_mirrors_transaction_fields() {
        let txn = AssetTransaction::buy(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AssetType::Share,
            3,
            Decimal::from(50),
            Utc::now() - Duration::minutes(1),
            "EUR",
            None,
        )
        .unwrap();

        let event = TransactionReceived::from_transaction(&txn);
        assert_eq!(event.transaction_id, txn.id());
        assert_eq!(event.total_amount, Decimal::from(150));
        assert_eq!(event.kind, TransactionKind::Buy);
    }

    #[test]
    fn event_serializes_as_camel_case_json() {
        let txn = AssetTransaction::sell(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AssetType::Bond,
            1,
            Decimal::from(10),
            Utc::now() - Duration::minutes(1),
            "USD",
            None,
        )
        .unwrap();

        let json = serde_json::to_value(TransactionReceived::from_transaction(&txn)).unwrap();
        assert!(json.get("transactionId").is_some());
        assert!(json.get("assetType").is_some());
        assert_eq!(json["kind"], "sell");
    }
}
