//! # Asset Analytics Kafka
//!
//! Kafka edge of the analytics pipeline, built on rdkafka:
//!
//! - [`BatchConsumer`]: batched, manually-committed ingestion of transaction
//!   messages with at-least-once delivery
//! - [`DeadLetterPublisher`]: forwards failed messages to `<topic>.dlq` with
//!   failure headers
//! - [`KafkaEventPublisher`]: publishes `TransactionReceived` events as JSON
//!
//! The consumer never auto-commits: after each batch it commits the offset
//! right after the last successfully processed message, so failures are
//! redelivered while the dead-letter copy preserves them for inspection.

pub mod config;
pub mod consumer;
pub mod dead_letter;
pub mod publisher;

pub use config::ConsumerConfig;
pub use consumer::{BatchConsumer, ConsumerError, ConsumerState};
pub use dead_letter::DeadLetterPublisher;
pub use publisher::{DEFAULT_EVENT_TOPIC, KafkaEventPublisher};

use thiserror::Error;

/// Errors raised while setting up Kafka clients.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// The underlying client could not be created.
    #[error("failed to create kafka client: {0}")]
    Creation(String),

    /// Subscribing to the inbound topic failed.
    #[error("failed to subscribe to '{topic}': {reason}")]
    Subscription {
        /// Topic the subscription targeted.
        topic: String,
        /// Client-level reason.
        reason: String,
    },
}
