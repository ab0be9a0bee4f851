//! Inbound wire format and the pure mapper into the domain.
//!
//! One [`TransactionMessage`] arrives per trade event as a JSON payload.
//! [`map_transaction`] decodes the integer discriminators strictly and then
//! delegates to the [`AssetTransaction`](crate::transaction::AssetTransaction)
//! factories, so a mapped transaction always satisfies the domain rules.
//! Any error is a per-message failure for the consumer, never a loop failure.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::transaction::{AssetTransaction, AssetType, TransactionError, TransactionKind};

/// The JSON wire message for one trade event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    /// Owning portfolio.
    pub portfolio_id: Uuid,
    /// Traded asset.
    pub stock_card_id: Uuid,
    /// 1 = Share, 2 = Bond, 3 = Crypto.
    pub asset_type: i32,
    /// 1 = Buy, 2 = Sell.
    pub transaction_type: i32,
    /// Units traded, must be positive.
    pub quantity: i32,
    /// Unit price, must not be negative.
    pub price_per_unit: Decimal,
    /// When the trade happened (ISO-8601 UTC).
    pub transaction_time: DateTime<Utc>,
    /// Currency code, at most 10 characters.
    pub currency: String,
    /// Optional free-form metadata.
    #[serde(default)]
    pub metadata: Option<String>,
}

/// Errors produced by [`map_transaction`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// `assetType` was outside 1..=3.
    #[error("unknown asset type code {0}")]
    UnknownAssetType(i32),

    /// `transactionType` was neither 1 nor 2.
    #[error("unknown transaction type code {0}")]
    UnknownTransactionType(i32),

    /// The decoded fields failed domain validation.
    #[error(transparent)]
    Invalid(#[from] TransactionError),
}

impl MessageError {
    /// Short stable name of the error class, used for DLQ headers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownAssetType(_) => "UnknownAssetType",
            Self::UnknownTransactionType(_) => "UnknownTransactionType",
            Self::Invalid(_) => "ValidationError",
        }
    }
}

/// Map a wire message to a validated domain transaction.
///
/// Pure and deterministic apart from the freshly generated record id.
///
/// # Errors
///
/// Returns [`MessageError::UnknownAssetType`] or
/// [`MessageError::UnknownTransactionType`] for out-of-domain discriminators,
/// or [`MessageError::Invalid`] when the factory validation fails.
pub fn map_transaction(message: &TransactionMessage) -> Result<AssetTransaction, MessageError> {
    let asset_type = AssetType::from_wire(message.asset_type)
        .ok_or(MessageError::UnknownAssetType(message.asset_type))?;
    let kind = TransactionKind::from_wire(message.transaction_type)
        .ok_or(MessageError::UnknownTransactionType(message.transaction_type))?;

    let transaction = match kind {
        TransactionKind::Buy => AssetTransaction::buy(
            message.portfolio_id,
            message.stock_card_id,
            asset_type,
            message.quantity,
            message.price_per_unit,
            message.transaction_time,
            message.currency.clone(),
            message.metadata.clone(),
        )?,
        TransactionKind::Sell => AssetTransaction::sell(
            message.portfolio_id,
            message.stock_card_id,
            asset_type,
            message.quantity,
            message.price_per_unit,
            message.transaction_time,
            message.currency.clone(),
            message.metadata.clone(),
        )?,
    };

    Ok(transaction)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::prelude::FromPrimitive;

    fn message() -> TransactionMessage {
        TransactionMessage {
            portfolio_id: Uuid::new_v4(),
            stock_card_id: Uuid::new_v4(),
            asset_type: 1,
            transaction_type: 1,
            quantity: 10,
            price_per_unit: Decimal::from_f64(100.0).unwrap(),
            transaction_time: Utc::now() - Duration::minutes(1),
            currency: "RUB".to_string(),
            metadata: None,
        }
    }

    #[test]
    fn maps_buy_message() {
        let txn = map_transaction(&message()).unwrap();
        assert_eq!(txn.kind(), TransactionKind::Buy);
        assert_eq!(txn.asset_type(), AssetType::Share);
        assert_eq!(txn.quantity(), 10);
        assert_eq!(txn.total_amount(), Decimal::from(1000));
    }

    #[test]
    fn maps_sell_message() {
        let mut msg = message();
        msg.transaction_type = 2;
        msg.asset_type = 3;
        let txn = map_transaction(&msg).unwrap();
        assert_eq!(txn.kind(), TransactionKind::Sell);
        assert_eq!(txn.asset_type(), AssetType::Crypto);
    }

    #[test]
    fn rejects_unknown_discriminators() {
        let mut msg = message();
        msg.asset_type = 9;
        assert_eq!(
            map_transaction(&msg).unwrap_err(),
            MessageError::UnknownAssetType(9)
        );

        let mut msg = message();
        msg.transaction_type = 3;
        assert_eq!(
            map_transaction(&msg).unwrap_err(),
            MessageError::UnknownTransactionType(3)
        );
    }

    #[test]
    fn surfaces_validation_failures() {
        let mut msg = message();
        msg.quantity = -1;
        let err = map_transaction(&msg).unwrap_err();
        assert_eq!(err, MessageError::Invalid(TransactionError::InvalidQuantity(-1)));
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn wire_json_round_trips() {
        let json = r#"{
            "portfolioId": "7f2c1a60-9f15-4a57-90f5-43c4b6f0a111",
            "stockCardId": "2d1ab4d8-7a8e-4f7e-8d14-5f3d5c2b9e22",
            "assetType": 2,
            "transactionType": 2,
            "quantity": 4,
            "pricePerUnit": "120.5",
            "transactionTime": "2025-06-01T10:00:00Z",
            "currency": "USD",
            "metadata": null
        }"#;
        let msg: TransactionMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.asset_type, 2);
        assert_eq!(msg.price_per_unit, Decimal::new(1205, 1));
        let txn = map_transaction(&msg).unwrap();
        assert_eq!(txn.total_amount(), Decimal::new(4820, 1));
    }
}
