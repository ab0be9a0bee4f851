//! The rating aggregate.
//!
//! An [`AssetRating`] holds the aggregated buy/sell statistics for one asset
//! over one period, scoped by an [`AnalysisContext`]: either across all
//! portfolios (`Global`) or within a single one (`Portfolio`). Ratings are
//! written only by the aggregation orchestrator and read-only everywhere else.
//!
//! # Uniqueness
//!
//! A rating is identified by `(asset_id, period_start, period_end, context,
//! portfolio_id-or-null)`; see [`RatingKey`]. The Global context requires
//! `portfolio_id` to be absent; the Portfolio context requires it present.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::period::Period;
use crate::transaction::AssetType;

/// Placeholder value for ranks that have not been assigned yet.
pub const UNRANKED: u32 = 0;

/// Scope discriminator for a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisContext {
    /// Aggregated across all portfolios.
    Global,
    /// Aggregated within a single portfolio.
    Portfolio,
}

impl AnalysisContext {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Portfolio => "portfolio",
        }
    }

    /// Parse the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(Self::Global),
            "portfolio" => Some(Self::Portfolio),
            _ => None,
        }
    }
}

/// Errors raised when constructing or updating an [`AssetRating`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatingError {
    /// Portfolio context requires a portfolio id.
    #[error("portfolio id is required for the portfolio context")]
    PortfolioIdRequired,

    /// Global context forbids a portfolio id.
    #[error("portfolio id must be absent for the global context")]
    PortfolioIdForbidden,

    /// Asset identifier was the nil uuid.
    #[error("asset id must not be nil")]
    NilAssetId,

    /// Ticker was empty.
    #[error("ticker must not be empty")]
    EmptyTicker,

    /// Display name was empty.
    #[error("asset name must not be empty")]
    EmptyName,

    /// A group of transactions to rate was empty.
    #[error("cannot rate an empty transaction group")]
    EmptyGroup,

    /// A transaction in the group referred to a different asset.
    #[error("transaction group mixes assets: expected {expected}, found {found}")]
    MixedGroup {
        /// Asset id the group is keyed on.
        expected: Uuid,
        /// The stray asset id.
        found: Uuid,
    },
}

/// The unique key of a rating row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RatingKey {
    /// Asset the rating describes.
    pub asset_id: Uuid,
    /// Inclusive period start.
    pub period_start: DateTime<Utc>,
    /// Exclusive period end.
    pub period_end: DateTime<Utc>,
    /// Scope discriminator.
    pub context: AnalysisContext,
    /// Owning portfolio for the Portfolio context, `None` for Global.
    pub portfolio_id: Option<Uuid>,
}

/// Aggregated per-asset statistics and ranks for one period and scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRating {
    id: Uuid,
    asset_id: Uuid,
    asset_type: AssetType,
    ticker: String,
    name: String,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    buy_transaction_count: u32,
    sell_transaction_count: u32,
    total_buy_amount: Decimal,
    total_sell_amount: Decimal,
    total_buy_quantity: i64,
    total_sell_quantity: i64,
    transaction_count_rank: u32,
    transaction_amount_rank: u32,
    last_updated: DateTime<Utc>,
    context: AnalysisContext,
    portfolio_id: Option<Uuid>,
}

impl AssetRating {
    /// Create an empty global-context rating for `asset_id` over `period`.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::NilAssetId`], [`RatingError::EmptyTicker`] or
    /// [`RatingError::EmptyName`] on invalid descriptive data.
    pub fn global(
        asset_id: Uuid,
        asset_type: AssetType,
        ticker: impl Into<String>,
        name: impl Into<String>,
        period: Period,
    ) -> Result<Self, RatingError> {
        Self::create(
            asset_id,
            asset_type,
            ticker.into(),
            name.into(),
            period,
            AnalysisContext::Global,
            None,
        )
    }

    /// Create an empty portfolio-context rating.
    ///
    /// # Errors
    ///
    /// As [`AssetRating::global`], plus [`RatingError::PortfolioIdRequired`]
    /// when `portfolio_id` is nil.
    pub fn portfolio(
        portfolio_id: Uuid,
        asset_id: Uuid,
        asset_type: AssetType,
        ticker: impl Into<String>,
        name: impl Into<String>,
        period: Period,
    ) -> Result<Self, RatingError> {
        if portfolio_id.is_nil() {
            return Err(RatingError::PortfolioIdRequired);
        }
        Self::create(
            asset_id,
            asset_type,
            ticker.into(),
            name.into(),
            period,
            AnalysisContext::Portfolio,
            Some(portfolio_id),
        )
    }

    fn create(
        asset_id: Uuid,
        asset_type: AssetType,
        ticker: String,
        name: String,
        period: Period,
        context: AnalysisContext,
        portfolio_id: Option<Uuid>,
    ) -> Result<Self, RatingError> {
        if asset_id.is_nil() {
            return Err(RatingError::NilAssetId);
        }
        if ticker.trim().is_empty() {
            return Err(RatingError::EmptyTicker);
        }
        if name.trim().is_empty() {
            return Err(RatingError::EmptyName);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            asset_id,
            asset_type,
            ticker,
            name,
            period_start: period.start(),
            period_end: period.end(),
            buy_transaction_count: 0,
            sell_transaction_count: 0,
            total_buy_amount: Decimal::ZERO,
            total_sell_amount: Decimal::ZERO,
            total_buy_quantity: 0,
            total_sell_quantity: 0,
            transaction_count_rank: UNRANKED,
            transaction_amount_rank: UNRANKED,
            last_updated: Utc::now(),
            context,
            portfolio_id,
        })
    }

    /// Rehydrate a rating from storage without validation.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub const fn from_stored(
        id: Uuid,
        asset_id: Uuid,
        asset_type: AssetType,
        ticker: String,
        name: String,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        buy_transaction_count: u32,
        sell_transaction_count: u32,
        total_buy_amount: Decimal,
        total_sell_amount: Decimal,
        total_buy_quantity: i64,
        total_sell_quantity: i64,
        transaction_count_rank: u32,
        transaction_amount_rank: u32,
        last_updated: DateTime<Utc>,
        context: AnalysisContext,
        portfolio_id: Option<Uuid>,
    ) -> Self {
        Self {
            id,
            asset_id,
            asset_type,
            ticker,
            name,
            period_start,
            period_end,
            buy_transaction_count,
            sell_transaction_count,
            total_buy_amount,
            total_sell_amount,
            total_buy_quantity,
            total_sell_quantity,
            transaction_count_rank,
            transaction_amount_rank,
            last_updated,
            context,
            portfolio_id,
        }
    }

    /// Replace the aggregated statistics. Used by the calculation engine.
    pub fn set_statistics(
        &mut self,
        buy_count: u32,
        sell_count: u32,
        buy_amount: Decimal,
        sell_amount: Decimal,
        buy_quantity: i64,
        sell_quantity: i64,
    ) {
        self.buy_transaction_count = buy_count;
        self.sell_transaction_count = sell_count;
        self.total_buy_amount = buy_amount;
        self.total_sell_amount = sell_amount;
        self.total_buy_quantity = buy_quantity;
        self.total_sell_quantity = sell_quantity;
        self.last_updated = Utc::now();
    }

    /// Assign both ranks. Ranks are 1-based; [`UNRANKED`] marks a rating the
    /// engine has not ranked yet.
    pub fn assign_ranks(&mut self, count_rank: u32, amount_rank: u32) {
        self.transaction_count_rank = count_rank;
        self.transaction_amount_rank = amount_rank;
        self.last_updated = Utc::now();
    }

    /// The unique key of this rating.
    #[must_use]
    pub const fn key(&self) -> RatingKey {
        RatingKey {
            asset_id: self.asset_id,
            period_start: self.period_start,
            period_end: self.period_end,
            context: self.context,
            portfolio_id: self.portfolio_id,
        }
    }

    /// `buy_transaction_count + sell_transaction_count`, the count-rank metric.
    #[must_use]
    pub fn transaction_count_total(&self) -> u64 {
        u64::from(self.buy_transaction_count) + u64::from(self.sell_transaction_count)
    }

    /// `total_buy_amount + total_sell_amount`, the amount-rank metric.
    #[must_use]
    pub fn transaction_amount_total(&self) -> Decimal {
        self.total_buy_amount + self.total_sell_amount
    }

    /// Whether both ranks have been assigned.
    #[must_use]
    pub const fn is_ranked(&self) -> bool {
        self.transaction_count_rank != UNRANKED && self.transaction_amount_rank != UNRANKED
    }

    /// Row identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Asset the rating describes.
    #[must_use]
    pub const fn asset_id(&self) -> Uuid {
        self.asset_id
    }

    /// Kind of asset.
    #[must_use]
    pub const fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    /// Asset ticker.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Asset display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inclusive period start.
    #[must_use]
    pub const fn period_start(&self) -> DateTime<Utc> {
        self.period_start
    }

    /// Exclusive period end.
    #[must_use]
    pub const fn period_end(&self) -> DateTime<Utc> {
        self.period_end
    }

    /// Number of buy transactions in the period.
    #[must_use]
    pub const fn buy_transaction_count(&self) -> u32 {
        self.buy_transaction_count
    }

    /// Number of sell transactions in the period.
    #[must_use]
    pub const fn sell_transaction_count(&self) -> u32 {
        self.sell_transaction_count
    }

    /// Sum of buy totals.
    #[must_use]
    pub const fn total_buy_amount(&self) -> Decimal {
        self.total_buy_amount
    }

    /// Sum of sell totals.
    #[must_use]
    pub const fn total_sell_amount(&self) -> Decimal {
        self.total_sell_amount
    }

    /// Sum of bought quantities.
    #[must_use]
    pub const fn total_buy_quantity(&self) -> i64 {
        self.total_buy_quantity
    }

    /// Sum of sold quantities.
    #[must_use]
    pub const fn total_sell_quantity(&self) -> i64 {
        self.total_sell_quantity
    }

    /// 1-based rank by transaction count, [`UNRANKED`] if unassigned.
    #[must_use]
    pub const fn transaction_count_rank(&self) -> u32 {
        self.transaction_count_rank
    }

    /// 1-based rank by transaction amount, [`UNRANKED`] if unassigned.
    #[must_use]
    pub const fn transaction_amount_rank(&self) -> u32 {
        self.transaction_amount_rank
    }

    /// Last time the statistics or ranks changed.
    #[must_use]
    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Scope discriminator.
    #[must_use]
    pub const fn context(&self) -> AnalysisContext {
        self.context
    }

    /// Owning portfolio for the Portfolio context.
    #[must_use]
    pub const fn portfolio_id(&self) -> Option<Uuid> {
        self.portfolio_id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn period() -> Period {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        Period::custom(start, end).unwrap()
    }

    #[test]
    fn global_rating_has_no_portfolio() {
        let rating =
            AssetRating::global(Uuid::new_v4(), AssetType::Share, "SBER", "Sberbank", period())
                .unwrap();
        assert_eq!(rating.context(), AnalysisContext::Global);
        assert_eq!(rating.portfolio_id(), None);
        assert!(!rating.is_ranked());
    }

    #[test]
    fn portfolio_rating_requires_portfolio_id() {
        let err = AssetRating::portfolio(
            Uuid::nil(),
            Uuid::new_v4(),
            AssetType::Share,
            "SBER",
            "Sberbank",
            period(),
        )
        .unwrap_err();
        assert_eq!(err, RatingError::PortfolioIdRequired);
    }

    #[test]
    fn rejects_empty_descriptive_fields() {
        let err =
            AssetRating::global(Uuid::new_v4(), AssetType::Bond, "  ", "Name", period())
                .unwrap_err();
        assert_eq!(err, RatingError::EmptyTicker);
        let err =
            AssetRating::global(Uuid::new_v4(), AssetType::Bond, "TCKR", "", period())
                .unwrap_err();
        assert_eq!(err, RatingError::EmptyName);
    }

    #[test]
    fn key_distinguishes_contexts() {
        let asset = Uuid::new_v4();
        let global =
            AssetRating::global(asset, AssetType::Share, "T", "T", period()).unwrap();
        let scoped = AssetRating::portfolio(
            Uuid::new_v4(),
            asset,
            AssetType::Share,
            "T",
            "T",
            period(),
        )
        .unwrap();
        assert_ne!(global.key(), scoped.key());
    }

    #[test]
    fn context_strings_round_trip() {
        for ctx in [AnalysisContext::Global, AnalysisContext::Portfolio] {
            assert_eq!(AnalysisContext::parse(ctx.as_str()), Some(ctx));
        }
        assert_eq!(AnalysisContext::parse("world"), None);
    }
}
