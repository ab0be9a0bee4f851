//! The rating calculation engine.
//!
//! Two deterministic, side-effect-free operations:
//!
//! - [`RatingCalculator::compute_group_rating`] folds one asset's
//!   transactions for a period into an [`AssetRating`] with unassigned ranks.
//! - [`RatingCalculator::assign_ranks`] ranks a set of ratings produced in
//!   one aggregation pass.
//!
//! # Rank policy
//!
//! Both ranks are 1-based and sequential with no gaps: descending on the
//! metric (`buy + sell` count, respectively `buy + sell` amount) with ties
//! broken by ascending `asset_id`. Every rating in a pass therefore gets a
//! distinct rank, and the assignment is reproducible for a fixed input set.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::period::Period;
use crate::rating::{AnalysisContext, AssetRating, RatingError};
use crate::transaction::{AssetTransaction, AssetType, TransactionKind};

/// Stateless engine computing rating statistics and ranks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatingCalculator;

impl RatingCalculator {
    /// Fold a single asset's transactions into a rating.
    ///
    /// The group must be non-empty and homogeneous: every transaction refers
    /// to the same asset. Ranks are left unassigned; call
    /// [`RatingCalculator::assign_ranks`] over the whole pass afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::EmptyGroup`] for an empty slice,
    /// [`RatingError::MixedGroup`] when the slice mixes assets, or a
    /// constructor error for invalid descriptive data or a context/portfolio
    /// mismatch.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_group_rating(
        transactions: &[AssetTransaction],
        period: Period,
        context: AnalysisContext,
        portfolio_id: Option<Uuid>,
        asset_type: AssetType,
        ticker: &str,
        name: &str,
    ) -> Result<AssetRating, RatingError> {
        let first = transactions.first().ok_or(RatingError::EmptyGroup)?;
        let asset_id = first.asset_id();
        if let Some(stray) = transactions.iter().find(|t| t.asset_id() != asset_id) {
            return Err(RatingError::MixedGroup {
                expected: asset_id,
                found: stray.asset_id(),
            });
        }

        let mut rating = match context {
            AnalysisContext::Global => {
                if portfolio_id.is_some() {
                    return Err(RatingError::PortfolioIdForbidden);
                }
                AssetRating::global(asset_id, asset_type, ticker, name, period)?
            }
            AnalysisContext::Portfolio => {
                let portfolio_id = portfolio_id.ok_or(RatingError::PortfolioIdRequired)?;
                AssetRating::portfolio(portfolio_id, asset_id, asset_type, ticker, name, period)?
            }
        };

        let mut buy_count: u32 = 0;
        let mut sell_count: u32 = 0;
        let mut buy_amount = Decimal::ZERO;
        let mut sell_amount = Decimal::ZERO;
        let mut buy_quantity: i64 = 0;
        let mut sell_quantity: i64 = 0;

        for transaction in transactions {
            match transaction.kind() {
                TransactionKind::Buy => {
                    buy_count += 1;
                    buy_amount += transaction.total_amount();
                    buy_quantity += i64::from(transaction.quantity());
                }
                TransactionKind::Sell => {
                    sell_count += 1;
                    sell_amount += transaction.total_amount();
                    sell_quantity += i64::from(transaction.quantity());
                }
            }
        }

        rating.set_statistics(
            buy_count,
            sell_count,
            buy_amount,
            sell_amount,
            buy_quantity,
            sell_quantity,
        );
        Ok(rating)
    }

    /// Assign both ranks across the ratings of one aggregation pass.
    ///
    /// After this call every rating carries a distinct
    /// `transaction_count_rank` and `transaction_amount_rank` in `1..=N`.
    pub fn assign_ranks(ratings: &mut [AssetRating]) {
        if ratings.is_empty() {
            return;
        }

        let count_ranks = Self::rank_positions(ratings, |r| {
            (std::cmp::Reverse(r.transaction_count_total()), r.asset_id())
        });
        let amount_ranks = Self::rank_positions(ratings, |r| {
            (std::cmp::Reverse(r.transaction_amount_total()), r.asset_id())
        });

        for (index, rating) in ratings.iter_mut().enumerate() {
            rating.assign_ranks(count_ranks[index], amount_ranks[index]);
        }
    }

    /// 1-based rank per input index under the given sort key.
    fn rank_positions<K, F>(ratings: &[AssetRating], key: F) -> Vec<u32>
    where
        K: Ord,
        F: Fn(&AssetRating) -> K,
    {
        let mut order: Vec<usize> = (0..ratings.len()).collect();
        order.sort_by_key(|&i| key(&ratings[i]));

        let mut ranks = vec![0u32; ratings.len()];
        for (position, &index) in order.iter().enumerate() {
            // Positions are bounded by the pass size, far below u32::MAX.
            #[allow(clippy::cast_possible_truncation)]
            let rank = position as u32 + 1;
            ranks[index] = rank;
        }
        ranks
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal::prelude::FromPrimitive;
    use std::collections::HashSet;

    fn period() -> Period {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        Period::custom(start, end).unwrap()
    }

    fn trade(
        asset_id: Uuid,
        kind: TransactionKind,
        quantity: i32,
        price: f64,
    ) -> AssetTransaction {
        let time = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let price = Decimal::from_f64(price).unwrap();
        let portfolio = Uuid::new_v4();
        match kind {
            TransactionKind::Buy => AssetTransaction::buy(
                portfolio,
                asset_id,
                AssetType::Share,
                quantity,
                price,
                time,
                "RUB",
                None,
            )
            .unwrap(),
            TransactionKind::Sell => AssetTransaction::sell(
                portfolio,
                asset_id,
                AssetType::Share,
                quantity,
                price,
                time,
                "RUB",
                None,
            )
            .unwrap(),
        }
    }

    fn rating_with_trades(trades: &[(TransactionKind, i32, f64)]) -> AssetRating {
        let asset = Uuid::new_v4();
        let group: Vec<_> = trades
            .iter()
            .map(|&(kind, quantity, price)| trade(asset, kind, quantity, price))
            .collect();
        RatingCalculator::compute_group_rating(
            &group,
            period(),
            AnalysisContext::Global,
            None,
            AssetType::Share,
            "TCKR",
            "Asset",
        )
        .unwrap()
    }

    #[test]
    fn buy_and_sell_statistics_are_partitioned() {
        // Spec example: {Buy 10@100, Sell 4@120}.
        let rating = rating_with_trades(&[
            (TransactionKind::Buy, 10, 100.0),
            (TransactionKind::Sell, 4, 120.0),
        ]);
        assert_eq!(rating.buy_transaction_count(), 1);
        assert_eq!(rating.sell_transaction_count(), 1);
        assert_eq!(rating.total_buy_amount(), Decimal::from(1000));
        assert_eq!(rating.total_sell_amount(), Decimal::from(480));
        assert_eq!(rating.total_buy_quantity(), 10);
        assert_eq!(rating.total_sell_quantity(), 4);
        assert!(!rating.is_ranked());
    }

    #[test]
    fn counts_cover_the_whole_group() {
        let rating = rating_with_trades(&[
            (TransactionKind::Buy, 1, 10.0),
            (TransactionKind::Buy, 2, 10.0),
            (TransactionKind::Sell, 3, 10.0),
        ]);
        assert_eq!(
            rating.buy_transaction_count() + rating.sell_transaction_count(),
            3
        );
    }

    #[test]
    fn empty_group_is_rejected() {
        let err = RatingCalculator::compute_group_rating(
            &[],
            period(),
            AnalysisContext::Global,
            None,
            AssetType::Share,
            "TCKR",
            "Asset",
        )
        .unwrap_err();
        assert_eq!(err, RatingError::EmptyGroup);
    }

    #[test]
    fn mixed_group_is_rejected() {
        let group = vec![
            trade(Uuid::new_v4(), TransactionKind::Buy, 1, 1.0),
            trade(Uuid::new_v4(), TransactionKind::Buy, 1, 1.0),
        ];
        let err = RatingCalculator::compute_group_rating(
            &group,
            period(),
            AnalysisContext::Global,
            None,
            AssetType::Share,
            "TCKR",
            "Asset",
        )
        .unwrap_err();
        assert!(matches!(err, RatingError::MixedGroup { .. }));
    }

    #[test]
    fn context_portfolio_mismatch_is_rejected() {
        let group = vec![trade(Uuid::new_v4(), TransactionKind::Buy, 1, 1.0)];
        let err = RatingCalculator::compute_group_rating(
            &group,
            period(),
            AnalysisContext::Global,
            Some(Uuid::new_v4()),
            AssetType::Share,
            "TCKR",
            "Asset",
        )
        .unwrap_err();
        assert_eq!(err, RatingError::PortfolioIdForbidden);

        let err = RatingCalculator::compute_group_rating(
            &group,
            period(),
            AnalysisContext::Portfolio,
            None,
            AssetType::Share,
            "TCKR",
            "Asset",
        )
        .unwrap_err();
        assert_eq!(err, RatingError::PortfolioIdRequired);
    }

    #[test]
    fn busier_asset_ranks_first() {
        // Spec example: buy counts 15 and 10 give ranks 1 and 2.
        let mut ratings = vec![
            rating_with_trades(&vec![(TransactionKind::Buy, 1, 1.0); 10]),
            rating_with_trades(&vec![(TransactionKind::Buy, 1, 1.0); 15]),
        ];
        RatingCalculator::assign_ranks(&mut ratings);
        assert_eq!(ratings[0].transaction_count_rank(), 2);
        assert_eq!(ratings[1].transaction_count_rank(), 1);
    }

    #[test]
    fn count_and_amount_ranks_are_independent() {
        let mut ratings = vec![
            // Two small trades: busier, but cheaper.
            rating_with_trades(&[
                (TransactionKind::Buy, 1, 1.0),
                (TransactionKind::Sell, 1, 1.0),
            ]),
            // One big trade: quieter, but worth more.
            rating_with_trades(&[(TransactionKind::Buy, 100, 100.0)]),
        ];
        RatingCalculator::assign_ranks(&mut ratings);
        assert_eq!(ratings[0].transaction_count_rank(), 1);
        assert_eq!(ratings[0].transaction_amount_rank(), 2);
        assert_eq!(ratings[1].transaction_count_rank(), 2);
        assert_eq!(ratings[1].transaction_amount_rank(), 1);
    }

    #[test]
    fn ties_break_by_ascending_asset_id() {
        let mut ratings = vec![
            rating_with_trades(&[(TransactionKind::Buy, 1, 10.0)]),
            rating_with_trades(&[(TransactionKind::Buy, 1, 10.0)]),
            rating_with_trades(&[(TransactionKind::Buy, 1, 10.0)]),
        ];
        RatingCalculator::assign_ranks(&mut ratings);

        let mut by_rank: Vec<_> = ratings
            .iter()
            .map(|r| (r.transaction_count_rank(), r.asset_id()))
            .collect();
        by_rank.sort_by_key(|&(rank, _)| rank);
        let ids: Vec<_> = by_rank.iter().map(|&(_, id)| id).collect();
        let mut sorted_ids = ids.clone();
        sorted_ids.sort();
        assert_eq!(ids, sorted_ids);
    }

    #[test]
    fn empty_pass_is_a_no_op() {
        let mut ratings: Vec<AssetRating> = vec![];
        RatingCalculator::assign_ranks(&mut ratings);
        assert!(ratings.is_empty());
    }

    proptest! {
        #[test]
        fn ranks_are_a_bijection_onto_one_to_n(
            counts in proptest::collection::vec(0u32..50, 1..20)
        ) {
            let mut ratings: Vec<AssetRating> = counts
                .iter()
                .map(|&n| {
                    let trades: Vec<_> =
                        std::iter::repeat((TransactionKind::Buy, 1, 1.0))
                            .take(n as usize)
                            .chain(std::iter::once((TransactionKind::Sell, 1, 1.0)))
                            .collect();
                    rating_with_trades(&trades)
                })
                .collect();

            RatingCalculator::assign_ranks(&mut ratings);

            let n = ratings.len() as u32;
            let count_ranks: HashSet<u32> =
                ratings.iter().map(AssetRating::transaction_count_rank).collect();
            let amount_ranks: HashSet<u32> =
                ratings.iter().map(AssetRating::transaction_amount_rank).collect();
            prop_assert_eq!(count_ranks, (1..=n).collect::<HashSet<u32>>());
            prop_assert_eq!(amount_ranks, (1..=n).collect::<HashSet<u32>>());
        }
    }
}
