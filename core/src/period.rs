//! Time periods for aggregation.
//!
//! A [`Period`] is a value object describing the half-open UTC range
//! `[start, end)` over which transactions are bucketed. Periods are
//! constructed through named factories and are immutable; equality is
//! by `(start, end)`.

use chrono::{DateTime, Duration, Months, Utc};
use thiserror::Error;

/// Maximum allowed period length in days.
pub const MAX_PERIOD_DAYS: i64 = 365;

/// Errors raised when constructing a [`Period`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    /// `start` was not strictly before `end`.
    #[error("period start {start} must be before end {end}")]
    StartNotBeforeEnd {
        /// The offending start instant.
        start: DateTime<Utc>,
        /// The offending end instant.
        end: DateTime<Utc>,
    },

    /// The range was longer than [`MAX_PERIOD_DAYS`].
    #[error("period length {days} days exceeds the maximum of {MAX_PERIOD_DAYS} days")]
    TooLong {
        /// Requested length in whole days.
        days: i64,
    },

    /// The reference instant could not be shifted (calendar overflow).
    #[error("reference instant out of range for period arithmetic")]
    ReferenceOutOfRange,
}

/// A half-open UTC time range `[start, end)`.
///
/// # Invariants
///
/// - `start < end`
/// - `end - start <= 365 days`
///
/// # Example
///
/// ```
/// use asset_analytics_core::period::Period;
/// use chrono::Utc;
///
/// # fn main() -> Result<(), asset_analytics_core::period::PeriodError> {
/// let now = Utc::now();
/// let period = Period::last_day(now)?;
/// assert!(period.contains(now - chrono::Duration::minutes(5)));
/// assert!(!period.contains(now)); // upper bound is exclusive
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Period {
    /// Create a period from explicit bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::StartNotBeforeEnd`] if `start >= end`, or
    /// [`PeriodError::TooLong`] if the range exceeds 365 days.
    pub fn custom(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, PeriodError> {
        if start >= end {
            return Err(PeriodError::StartNotBeforeEnd { start, end });
        }
        let length = end - start;
        if length > Duration::days(MAX_PERIOD_DAYS) {
            return Err(PeriodError::TooLong {
                days: length.num_days(),
            });
        }
        Ok(Self { start, end })
    }

    /// The hour ending at `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::ReferenceOutOfRange`] on calendar overflow.
    pub fn last_hour(reference: DateTime<Utc>) -> Result<Self, PeriodError> {
        let start = reference
            .checked_sub_signed(Duration::hours(1))
            .ok_or(PeriodError::ReferenceOutOfRange)?;
        Self::custom(start, reference)
    }

    /// The day ending at `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::ReferenceOutOfRange`] on calendar overflow.
    pub fn last_day(reference: DateTime<Utc>) -> Result<Self, PeriodError> {
        let start = reference
            .checked_sub_signed(Duration::days(1))
            .ok_or(PeriodError::ReferenceOutOfRange)?;
        Self::custom(start, reference)
    }

    /// The week ending at `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::ReferenceOutOfRange`] on calendar overflow.
    pub fn last_week(reference: DateTime<Utc>) -> Result<Self, PeriodError> {
        let start = reference
            .checked_sub_signed(Duration::days(7))
            .ok_or(PeriodError::ReferenceOutOfRange)?;
        Self::custom(start, reference)
    }

    /// The calendar month ending at `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::ReferenceOutOfRange`] on calendar overflow.
    pub fn last_month(reference: DateTime<Utc>) -> Result<Self, PeriodError> {
        let start = reference
            .checked_sub_months(Months::new(1))
            .ok_or(PeriodError::ReferenceOutOfRange)?;
        Self::custom(start, reference)
    }

    /// Start of the range (inclusive).
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the range (exclusive).
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the range.
    #[must_use]
    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    /// Whether `instant` falls inside `[start, end)`.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} - {})",
            self.start.format("%Y-%m-%d %H:%M:%S UTC"),
            self.end.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}
