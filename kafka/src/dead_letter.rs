//! Dead-letter queue publisher.
//!
//! Failed inbound messages are forwarded verbatim to `<topic>.dlq` with
//! headers describing the failure, so operators can inspect and replay them.

use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{error, warn};

use crate::ClientError;

/// Header naming the topic the message originally arrived on.
pub const HEADER_ORIGINAL_TOPIC: &str = "original-topic";
/// Header carrying the failure description.
pub const HEADER_ERROR_MESSAGE: &str = "error-message";
/// Header carrying the stable failure class.
pub const HEADER_ERROR_TYPE: &str = "error-type";
/// Header carrying the RFC 3339 UTC time of dead-lettering.
pub const HEADER_TIMESTAMP: &str = "timestamp";

/// Forwards failed messages to the paired dead-letter topic.
pub struct DeadLetterPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl DeadLetterPublisher {
    /// Create a dead-letter producer on the given brokers.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Creation`] when the producer cannot be built.
    pub fn new(brokers: &str) -> Result<Self, ClientError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "1")
            .create()
            .map_err(|e| ClientError::Creation(e.to_string()))?;

        Ok(Self {
            producer,
            timeout: Duration::from_secs(5),
        })
    }

    /// Forward one failed message, key and payload unchanged.
    ///
    /// Best-effort: a delivery failure is logged and counted, the original
    /// message is not retried. Dead-lettering never aborts the consume loop.
    pub async fn publish(
        &self,
        original_topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
        error_type: &str,
        error_message: &str,
    ) {
        let dlq_topic = format!("{original_topic}.dlq");
        let headers = failure_headers(original_topic, error_type, error_message);

        let record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(&dlq_topic)
            .payload(payload)
            .headers(headers);
        let record = match key {
            Some(key) => record.key(key),
            None => record,
        };

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok(_) => {
                counter!("analytics.consumer.dead_letters").increment(1);
                warn!(
                    topic = %dlq_topic,
                    error_type = error_type,
                    error = error_message,
                    "message dead-lettered"
                );
            }
            Err((kafka_error, _)) => {
                counter!("analytics.consumer.dead_letter_failures").increment(1);
                error!(
                    topic = %dlq_topic,
                    error_type = error_type,
                    error = %kafka_error,
                    "failed to dead-letter message"
                );
            }
        }
    }
}

/// Diagnostic headers attached to every dead-lettered message.
fn failure_headers(original_topic: &str, error_type: &str, error_message: &str) -> OwnedHeaders {
    OwnedHeaders::new()
        .insert(Header {
            key: HEADER_ORIGINAL_TOPIC,
            value: Some(original_topic),
        })
        .insert(Header {
            key: HEADER_ERROR_MESSAGE,
            value: Some(error_message),
        })
        .insert(Header {
            key: HEADER_ERROR_TYPE,
            value: Some(error_type),
        })
        .insert(Header {
            key: HEADER_TIMESTAMP,
            value: Some(&Utc::now().to_rfc3339()),
        })
}
