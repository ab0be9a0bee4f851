//! The transaction batch consumer.
//!
//! Pulls [`TransactionMessage`] JSON payloads from the inbound topic in
//! batches, processes each message independently, dead-letters failures, and
//! commits the offset of the last successfully processed message so failed
//! messages can be redelivered.
//!
//! # Delivery semantics
//!
//! At-least-once. Auto-commit is disabled; the consumer commits `offset + 1`
//! of the last success in each batch. A crash between processing and commit
//! redelivers the tail of the batch, so downstream persistence must tolerate
//! duplicates.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use metrics::counter;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use asset_analytics_core::event::{EventPublisher, TransactionReceived};
use asset_analytics_core::message::{TransactionMessage, map_transaction};
use asset_analytics_core::store::TransactionStore;

use crate::ClientError;
use crate::config::{
    BROKER_RETRY_BACKOFF, ConsumerConfig, POLL_TIMEOUT, UNEXPECTED_RETRY_BACKOFF,
};
use crate::dead_letter::DeadLetterPublisher;

/// Lifecycle of a [`BatchConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsumerState {
    /// Not consuming; `run` may be called.
    Idle = 0,
    /// The consume loop is active.
    Running = 1,
    /// Shutdown was requested; the loop is draining.
    ShuttingDown = 2,
}

impl ConsumerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Idle,
        }
    }
}

/// Errors raised by the batch consumer.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// `run` was called while a consume loop was already active.
    #[error("consumer is already running")]
    AlreadyRunning,

    /// A Kafka client could not be created or subscribed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The broker rejected a poll.
    #[error("broker error: {0}")]
    Broker(String),

    /// The offset commit failed.
    #[error("offset commit failed: {0}")]
    Commit(String),
}

/// Why one message failed, for the dead-letter headers.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MessageFailure {
    error_type: &'static str,
    error_message: String,
}

/// Per-message processing result.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MessageOutcome {
    Succeeded { partition: i32, offset: i64 },
    Failed { failure: MessageFailure },
}

/// Scope of one batch: outcomes in batch order, consulted for the DLQ and
/// commit decisions after processing finishes. Lives exactly as long as the
/// batch it describes.
#[derive(Debug, Default)]
struct BatchContext {
    outcomes: Vec<MessageOutcome>,
}

impl BatchContext {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(capacity),
        }
    }

    fn record(&mut self, outcome: MessageOutcome) {
        self.outcomes.push(outcome);
    }

    fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MessageOutcome::Succeeded { .. }))
            .count()
    }

    fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Failures paired with their batch index, so the original message can be
    /// forwarded to the dead-letter topic.
    fn failures(&self) -> impl Iterator<Item = (usize, &MessageFailure)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                MessageOutcome::Failed { failure } => Some((index, failure)),
                MessageOutcome::Succeeded { .. } => None,
            })
    }

    /// Partition and offset of the last success in the batch, if any.
    fn commit_position(&self) -> Option<(i32, i64)> {
        self.outcomes.iter().rev().find_map(|outcome| match outcome {
            MessageOutcome::Succeeded { partition, offset } => Some((*partition, *offset)),
            MessageOutcome::Failed { .. } => None,
        })
    }
}

/// Consumes transaction messages in batches and feeds the ingestion pipeline:
/// deserialize, map to the domain, persist, publish the domain event.
pub struct BatchConsumer {
    consumer: StreamConsumer,
    config: ConsumerConfig,
    store: Arc<dyn TransactionStore>,
    events: Arc<dyn EventPublisher>,
    dead_letters: DeadLetterPublisher,
    state: AtomicU8,
}

impl BatchConsumer {
    /// Create a consumer over the given stores and brokers.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Client`] when the Kafka clients cannot be
    /// created.
    pub fn new(
        config: ConsumerConfig,
        store: Arc<dyn TransactionStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self, ConsumerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| ClientError::Creation(e.to_string()))?;

        let dead_letters = DeadLetterPublisher::new(&config.bootstrap_servers)?;

        Ok(Self {
            consumer,
            config,
            store,
            events,
            dead_letters,
            state: AtomicU8::new(ConsumerState::Idle as u8),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Run the consume loop until `shutdown` flips to `true`.
    ///
    /// Broker errors back off for one second, unexpected batch failures for
    /// five; neither terminates the loop. Shutdown interrupts batch
    /// accumulation only: a batch that has already been collected is
    /// processed, dead-lettered and committed before the loop exits.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::AlreadyRunning`] when a loop is already
    /// active and [`ConsumerError::Client`] when the subscription fails.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        self.state
            .compare_exchange(
                ConsumerState::Idle as u8,
                ConsumerState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| ConsumerError::AlreadyRunning)?;

        if let Err(error) = self.consumer.subscribe(&[self.config.topic.as_str()]) {
            self.state
                .store(ConsumerState::Idle as u8, Ordering::SeqCst);
            return Err(ClientError::Subscription {
                topic: self.config.topic.clone(),
                reason: error.to_string(),
            }
            .into());
        }

        info!(
            topic = %self.config.topic,
            group = %self.config.group_id,
            batch_size = self.config.batch_size,
            "batch consumer started"
        );

        loop {
            if *shutdown.borrow() || self.state() == ConsumerState::ShuttingDown {
                self.state
                    .store(ConsumerState::ShuttingDown as u8, Ordering::SeqCst);
                break;
            }
            match self.consume_once(&mut shutdown).await {
                Ok(()) => {}
                Err(ConsumerError::Broker(reason)) => {
                    counter!("analytics.consumer.broker_errors").increment(1);
                    error!(error = %reason, "broker error, backing off");
                    sleep(BROKER_RETRY_BACKOFF).await;
                }
                Err(error) => {
                    error!(error = %error, "unexpected consumer error, backing off");
                    sleep(UNEXPECTED_RETRY_BACKOFF).await;
                }
            }
        }

        self.state.store(ConsumerState::Idle as u8, Ordering::SeqCst);
        info!(topic = %self.config.topic, "batch consumer stopped");
        Ok(())
    }

    /// Collect one batch, process it, dead-letter the failures, commit
    /// progress. Only the collection phase watches `shutdown`; once a batch
    /// exists it always runs to the commit decision.
    async fn consume_once(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ConsumerError> {
        let (batch, broker_error) = self.next_batch(shutdown).await;

        if !batch.is_empty() {
            counter!("analytics.consumer.batches").increment(1);
            let context = self.process_batch(&batch).await;
            self.dead_letter_failures(&batch, &context).await;
            self.commit_progress(&context)?;
        }

        match broker_error {
            Some(reason) => Err(ConsumerError::Broker(reason)),
            None => Ok(()),
        }
    }

    /// Fill a batch up to `batch_size`, flushing early when the topic goes
    /// quiet for [`POLL_TIMEOUT`] or shutdown is signalled. A broker error is
    /// surfaced alongside the messages collected so far, so none of them are
    /// dropped.
    async fn next_batch(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> (Vec<OwnedMessage>, Option<String>) {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        while batch.len() < self.config.batch_size {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.state
                            .store(ConsumerState::ShuttingDown as u8, Ordering::SeqCst);
                        break;
                    }
                }
                polled = timeout(POLL_TIMEOUT, self.consumer.recv()) => {
                    match polled {
                        Ok(Ok(message)) => batch.push(message.detach()),
                        Ok(Err(error)) => return (batch, Some(error.to_string())),
                        Err(_) => break,
                    }
                }
            }
        }
        (batch, None)
    }

    /// Process messages strictly in order; out-of-order completion would make
    /// the committed offset meaningless.
    async fn process_batch(&self, batch: &[OwnedMessage]) -> BatchContext {
        debug!(messages = batch.len(), "processing batch");
        let mut context = BatchContext::with_capacity(batch.len());
        for message in batch {
            let outcome = match self.process_message(message).await {
                Ok(()) => MessageOutcome::Succeeded {
                    partition: message.partition(),
                    offset: message.offset(),
                },
                Err(failure) => MessageOutcome::Failed { failure },
            };
            context.record(outcome);
        }

        counter!("analytics.consumer.messages_processed")
            .increment(context.succeeded() as u64);
        counter!("analytics.consumer.messages_failed").increment(context.failed() as u64);
        context
    }

    /// Deserialize, map, persist, publish.
    async fn process_message(&self, message: &OwnedMessage) -> Result<(), MessageFailure> {
        let Some(payload) = message.payload() else {
            return Err(MessageFailure {
                error_type: "DeserializationError",
                error_message: "message has no payload".to_string(),
            });
        };

        let wire: TransactionMessage =
            serde_json::from_slice(payload).map_err(|error| MessageFailure {
                error_type: "DeserializationError",
                error_message: error.to_string(),
            })?;

        let transaction = map_transaction(&wire).map_err(|error| MessageFailure {
            error_type: error.kind(),
            error_message: error.to_string(),
        })?;

        self.store
            .insert(&transaction)
            .await
            .map_err(|error| MessageFailure {
                error_type: "PersistenceError",
                error_message: error.to_string(),
            })?;

        // The transaction is durable from here on. A publish failure is
        // logged but does not fail the message or roll anything back.
        let event = TransactionReceived::from_transaction(&transaction);
        if let Err(error) = self.events.publish(&event).await {
            warn!(
                transaction_id = %transaction.id(),
                error = %error,
                "transaction persisted but event publish failed"
            );
        }

        Ok(())
    }

    /// Forward every failed message of the batch to the dead-letter topic,
    /// one at a time, with its original key and payload.
    async fn dead_letter_failures(&self, batch: &[OwnedMessage], context: &BatchContext) {
        for (index, failure) in context.failures() {
            let message = &batch[index];
            self.dead_letters
                .publish(
                    message.topic(),
                    message.key(),
                    message.payload().unwrap_or_default(),
                    failure.error_type,
                    &failure.error_message,
                )
                .await;
        }
    }

    fn commit_progress(&self, context: &BatchContext) -> Result<(), ConsumerError> {
        let Some((partition, offset)) = context.commit_position() else {
            return Ok(());
        };

        let mut list = TopicPartitionList::new();
        list.add_partition_offset(&self.config.topic, partition, Offset::Offset(offset + 1))
            .map_err(|e| ConsumerError::Commit(e.to_string()))?;
        self.consumer
            .commit(&list, CommitMode::Async)
            .map_err(|e| ConsumerError::Commit(e.to_string()))?;

        debug!(
            topic = %self.config.topic,
            partition = partition,
            next_offset = offset + 1,
            succeeded = context.succeeded(),
            failed = context.failed(),
            "committed batch progress"
        );
        Ok(())
    }
}
