//! The transaction aggregate.
//!
//! An [`AssetTransaction`] is immutable once created: fields are private and
//! there are no mutators. Construction goes through the [`AssetTransaction::buy`]
//! and [`AssetTransaction::sell`] factories, which enforce the domain
//! validation rules. Records are only ever inserted and read; there is no
//! update path.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of a currency code.
pub const MAX_CURRENCY_LEN: usize = 10;

/// Clock-skew tolerance for transaction timestamps.
const FUTURE_TOLERANCE_SECS: i64 = 60;

/// Kind of asset a transaction refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Equity share.
    Share,
    /// Fixed-income bond.
    Bond,
    /// Cryptocurrency.
    Crypto,
}

impl AssetType {
    /// Decode the wire representation (1 = Share, 2 = Bond, 3 = Crypto).
    #[must_use]
    pub const fn from_wire(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Share),
            2 => Some(Self::Bond),
            3 => Some(Self::Crypto),
            _ => None,
        }
    }

    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Share => "share",
            Self::Bond => "bond",
            Self::Crypto => "crypto",
        }
    }

    /// Parse the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "share" => Some(Self::Share),
            "bond" => Some(Self::Bond),
            "crypto" => Some(Self::Crypto),
            _ => None,
        }
    }
}

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Asset was bought.
    Buy,
    /// Asset was sold.
    Sell,
}

impl TransactionKind {
    /// Decode the wire representation (1 = Buy, 2 = Sell).
    #[must_use]
    pub const fn from_wire(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Buy),
            2 => Some(Self::Sell),
            _ => None,
        }
    }

    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// Parse the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// Validation errors for [`AssetTransaction`] construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Portfolio identifier was the nil uuid.
    #[error("portfolio id must not be nil")]
    NilPortfolioId,

    /// Asset identifier was the nil uuid.
    #[error("asset id must not be nil")]
    NilAssetId,

    /// Quantity was zero or negative.
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    /// Unit price was negative.
    #[error("price per unit must not be negative, got {0}")]
    NegativePrice(Decimal),

    /// Currency code was empty or blank.
    #[error("currency must not be empty")]
    EmptyCurrency,

    /// Currency code exceeded [`MAX_CURRENCY_LEN`] characters.
    #[error("currency must be at most {MAX_CURRENCY_LEN} characters, got {0}")]
    CurrencyTooLong(usize),

    /// Transaction timestamp was more than a minute in the future.
    #[error("transaction time {0} is in the future")]
    TimestampInFuture(DateTime<Utc>),
}

/// An immutable record of a single buy or sell.
///
/// `total_amount` is derived at construction as `quantity × price_per_unit`
/// and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTransaction {
    id: Uuid,
    portfolio_id: Uuid,
    asset_id: Uuid,
    asset_type: AssetType,
    kind: TransactionKind,
    quantity: i32,
    price_per_unit: Decimal,
    total_amount: Decimal,
    transaction_time: DateTime<Utc>,
    currency: String,
    metadata: Option<String>,
}

impl AssetTransaction {
    /// Create a buy transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`TransactionError`] if any field violates the domain rules:
    /// nil identifiers, non-positive quantity, negative price, empty or
    /// over-long currency, or a timestamp more than one minute in the future.
    #[allow(clippy::too_many_arguments)]
    pub fn buy(
        portfolio_id: Uuid,
        asset_id: Uuid,
        asset_type: AssetType,
        quantity: i32,
        price_per_unit: Decimal,
        transaction_time: DateTime<Utc>,
        currency: impl Into<String>,
        metadata: Option<String>,
    ) -> Result<Self, TransactionError> {
        Self::create(
            portfolio_id,
            asset_id,
            asset_type,
            TransactionKind::Buy,
            quantity,
            price_per_unit,
            transaction_time,
            currency.into(),
            metadata,
        )
    }

    /// Create a sell transaction.
    ///
    /// # Errors
    ///
    /// Same validation rules as [`AssetTransaction::buy`].
    #[allow(clippy::too_many_arguments)]
    pub fn sell(
        portfolio_id: Uuid,
        asset_id: Uuid,
        asset_type: AssetType,
        quantity: i32,
        price_per_unit: Decimal,
        transaction_time: DateTime<Utc>,
        currency: impl Into<String>,
        metadata: Option<String>,
    ) -> Result<Self, TransactionError> {
        Self::create(
            portfolio_id,
            asset_id,
            asset_type,
            TransactionKind::Sell,
            quantity,
            price_per_unit,
            transaction_time,
            currency.into(),
            metadata,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        portfolio_id: Uuid,
        asset_id: Uuid,
        asset_type: AssetType,
        kind: TransactionKind,
        quantity: i32,
        price_per_unit: Decimal,
        transaction_time: DateTime<Utc>,
        currency: String,
        metadata: Option<String>,
    ) -> Result<Self, TransactionError> {
        if portfolio_id.is_nil() {
            return Err(TransactionError::NilPortfolioId);
        }
        if asset_id.is_nil() {
            return Err(TransactionError::NilAssetId);
        }
        if quantity <= 0 {
            return Err(TransactionError::InvalidQuantity(quantity));
        }
        if price_per_unit.is_sign_negative() {
            return Err(TransactionError::NegativePrice(price_per_unit));
        }
        if currency.trim().is_empty() {
            return Err(TransactionError::EmptyCurrency);
        }
        if currency.chars().count() > MAX_CURRENCY_LEN {
            return Err(TransactionError::CurrencyTooLong(currency.chars().count()));
        }
        let horizon = Utc::now() + Duration::seconds(FUTURE_TOLERANCE_SECS);
        if transaction_time > horizon {
            return Err(TransactionError::TimestampInFuture(transaction_time));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            portfolio_id,
            asset_id,
            asset_type,
            kind,
            quantity,
            price_per_unit,
            total_amount: Decimal::from(quantity) * price_per_unit,
            transaction_time,
            currency,
            metadata,
        })
    }

    /// Rehydrate a previously validated record, e.g. from a database row.
    ///
    /// Skips validation; callers must only pass data that originally went
    /// through [`AssetTransaction::buy`] or [`AssetTransaction::sell`].
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub const fn from_stored(
        id: Uuid,
        portfolio_id: Uuid,
        asset_id: Uuid,
        asset_type: AssetType,
        kind: TransactionKind,
        quantity: i32,
        price_per_unit: Decimal,
        total_amount: Decimal,
        transaction_time: DateTime<Utc>,
        currency: String,
        metadata: Option<String>,
    ) -> Self {
        Self {
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
        }
    }

    /// Unique identifier of this record.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Portfolio the transaction belongs to.
    #[must_use]
    pub const fn portfolio_id(&self) -> Uuid {
        self.portfolio_id
    }

    /// Asset the transaction refers to.
    #[must_use]
    pub const fn asset_id(&self) -> Uuid {
        self.asset_id
    }

    /// Kind of asset.
    #[must_use]
    pub const fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    /// Buy or sell.
    #[must_use]
    pub const fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Number of units traded.
    #[must_use]
    pub const fn quantity(&self) -> i32 {
        self.quantity
    }

    /// Price per unit.
    #[must_use]
    pub const fn price_per_unit(&self) -> Decimal {
        self.price_per_unit
    }

    /// Derived `quantity × price_per_unit`.
    #[must_use]
    pub const fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    /// When the trade happened.
    #[must_use]
    pub const fn transaction_time(&self) -> DateTime<Utc> {
        self.transaction_time
    }

    /// Currency code of the trade.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Optional free-form metadata.
    #[must_use]
    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }
}
