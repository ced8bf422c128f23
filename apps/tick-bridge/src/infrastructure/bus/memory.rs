//! In-process pub/sub.
//!
//! One `tokio::sync::broadcast` channel per bus channel, created on first use.
//! Like a real pub/sub server, a message published with no subscriber is lost.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::application::ports::{BusError, BusStream, MessageBus};

/// Default per-channel buffer.
pub const DEFAULT_CAPACITY: usize = 4096;

/// In-process [`MessageBus`].
#[derive(Debug)]
pub struct InMemoryBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
    injected_failures: AtomicU32,
    publish_attempts: AtomicU64,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InMemoryBus {
    /// Create a bus whose channels buffer `capacity` messages per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            injected_failures: AtomicU32::new(0),
            publish_attempts: AtomicU64::new(0),
        }
    }

    /// Make the next `count` publishes fail with a connection error.
    pub fn fail_next_publishes(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Publish calls seen so far, failed ones included.
    #[must_use]
    pub fn publish_attempts(&self) -> u64 {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    /// Drop every channel, ending all current subscriptions.
    pub fn disconnect_all(&self) {
        self.channels.lock().clear();
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_failure() {
            return Err(BusError::Connection("injected failure".to_string()));
        }

        // No receivers is not an error for pub/sub.
        let _ = self.sender(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BusStream, BusError> {
        let receiver = self.sender(channel).subscribe();
        let stream = BroadcastStream::new(receiver).map(|item| {
            item.map_err(|lagged| BusError::Backend(format!("subscriber {lagged}")))
        });
        Ok(Box::pin(stream))
    }
}
