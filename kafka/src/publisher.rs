//! Kafka-backed [`EventPublisher`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use metrics::counter;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{debug, error};

use asset_analytics_core::event::{EventPublishError, EventPublisher, TransactionReceived};

use crate::ClientError;

/// Default topic for [`TransactionReceived`] events.
pub const DEFAULT_EVENT_TOPIC: &str = "analytics.transaction-received";

/// Publishes [`TransactionReceived`] events as JSON, keyed by the transaction
/// id so redeliveries of the same record land on the same partition.
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaEventPublisher {
    /// Create a publisher for `topic` on the given brokers.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Creation`] when the producer cannot be built.
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, ClientError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "1")
            .create()
            .map_err(|e| ClientError::Creation(e.to_string()))?;

        Ok(Self {
            producer,
            topic: topic.into(),
            timeout: Duration::from_secs(5),
        })
    }
}

impl EventPublisher for KafkaEventPublisher {
    fn publish<'a>(
        &'a self,
        event: &'a TransactionReceived,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventPublishError>> + Send + 'a>> {
        Box::pin(async move {
            let payload = serde_json::to_vec(event)
                .map_err(|e| EventPublishError::SerializationFailed(e.to_string()))?;
            let key = event.transaction_id.to_string();

            let record = FutureRecord::to(&self.topic).payload(&payload).key(&key);
            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    counter!("analytics.events.published").increment(1);
                    debug!(
                        topic = %self.topic,
                        partition = partition,
                        offset = offset,
                        transaction_id = %event.transaction_id,
                        "transaction event published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    counter!("analytics.events.publish_failures").increment(1);
                    error!(
                        topic = %self.topic,
                        transaction_id = %event.transaction_id,
                        error = %kafka_error,
                        "failed to publish transaction event"
                    );
                    Err(EventPublishError::PublishFailed {
                        topic: self.topic.clone(),
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }
}
