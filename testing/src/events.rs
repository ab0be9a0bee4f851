//! Recording event publisher.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on lock acquisition

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use asset_analytics_core::event::{EventPublishError, EventPublisher, TransactionReceived};

/// [`EventPublisher`] that records every published event in memory.
///
/// With [`fail_publishes`](Self::fail_publishes) armed, publishes are rejected
/// without recording, which lets tests exercise the publish-failure path of
/// the batch consumer (the transaction stays persisted, the failure is only
/// logged).
#[derive(Clone, Debug, Default)]
pub struct RecordingEventPublisher {
    events: Arc<RwLock<Vec<TransactionReceived>>>,
    fail_publishes: Arc<RwLock<bool>>,
}

impl RecordingEventPublisher {
    /// Create an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm or disarm publish failure injection.
    pub fn fail_publishes(&self, fail: bool) {
        *self.fail_publishes.write().unwrap() = fail;
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    /// Whether no events were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().unwrap().is_empty()
    }

    /// Snapshot of all recorded events, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<TransactionReceived> {
        self.events.read().unwrap().clone()
    }

    /// Clear recorded events and failure injections (for test isolation).
    pub fn clear(&self) {
        self.events.write().unwrap().clear();
        *self.fail_publishes.write().unwrap() = false;
    }
}

impl EventPublisher for RecordingEventPublisher {
    fn publish<'a>(
        &'a self,
        event: &'a TransactionReceived,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventPublishError>> + Send + 'a>> {
        Box::pin(async move {
            if *self.fail_publishes.read().unwrap() {
                return Err(EventPublishError::PublishFailed {
                    topic: "recording".to_string(),
                    reason: "injected publish failure".to_string(),
                });
            }
            self.events.write().unwrap().push(event.clone());
            Ok(())
        })
    }
}
