//! # Asset Analytics Core
//!
//! Domain model and calculation engine for the transaction analytics pipeline.
//!
//! This crate is pure domain logic: it knows nothing about Kafka or Postgres.
//! The I/O edges are expressed as traits ([`store::TransactionStore`],
//! [`store::RatingStore`], [`event::EventPublisher`]) implemented by the
//! `asset-analytics-postgres` and `asset-analytics-kafka` crates.
//!
//! ## Core Concepts
//!
//! - **[`transaction::AssetTransaction`]**: an immutable, validated record of a
//!   buy or sell, created only through factory functions.
//! - **[`period::Period`]**: a UTC time range `[start, end)` used to bucket
//!   transactions for aggregation.
//! - **[`rating::AssetRating`]**: per-asset aggregate statistics and ranks for
//!   one period, scoped either globally or to a single portfolio.
//! - **[`ranking::RatingCalculator`]**: the deterministic engine that turns a
//!   group of transactions into a rating and assigns competitive ranks.
//! - **[`message::TransactionMessage`]**: the inbound wire format, mapped into
//!   the domain by [`message::map_transaction`].

pub mod event;
pub mod message;
pub mod period;
pub mod ranking;
pub mod rating;
pub mod store;
pub mod transaction;

pub use event::{EventPublishError, EventPublisher, TransactionReceived};
pub use message::{map_transaction, MessageError, TransactionMessage};
pub use period::{Period, PeriodError};
pub use ranking::RatingCalculator;
pub use rating::{AnalysisContext, AssetRating, RatingError, RatingKey};
pub use store::{RatingQuery, RatingStore, StoreError, TransactionStore};
pub use transaction::{AssetTransaction, AssetType, TransactionError, TransactionKind};
