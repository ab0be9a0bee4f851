//! Consumer configuration.

use std::time::Duration;

/// Default number of messages per processing batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Bound on a single poll while filling a batch. A quiet topic therefore
/// flushes a partial batch at least once per second.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pause after a broker-level consume error before polling again.
pub const BROKER_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Pause after an unexpected batch failure before polling again.
pub const UNEXPECTED_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Settings for the transaction batch consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Comma-separated broker addresses.
    pub bootstrap_servers: String,
    /// Consumer group id.
    pub group_id: String,
    /// Topic carrying inbound transaction messages.
    pub topic: String,
    /// Messages per processing batch.
    pub batch_size: usize,
}

impl ConsumerConfig {
    /// Configuration with the default batch size.
    #[must_use]
    pub fn new(
        bootstrap_servers: impl Into<String>,
        group_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: group_id.into(),
            topic: topic.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Dead-letter topic paired with the inbound topic.
    #[must_use]
    pub fn dlq_topic(&self) -> String {
        format!("{}.dlq", self.topic)
    }
}
