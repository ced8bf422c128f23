//! Outbound publish queue.
//!
//! Producers enqueue and return; a single worker drains the queue in order
//! through the retrying bus. A bus outage therefore only stalls producers once
//! the queue is full.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BusError, Channel, Publisher};
use crate::infrastructure::metrics;

#[derive(Debug)]
struct Outbound {
    channel: Channel,
    payload: String,
}

/// Queue-backed [`Publisher`].
#[derive(Debug, Clone)]
pub struct PublishQueue {
    tx: mpsc::Sender<Outbound>,
}

impl PublishQueue {
    /// Start the worker. It stops when `cancel` fires or every queue handle is
    /// dropped and the backlog is drained.
    #[must_use]
    pub fn spawn(
        publisher: Arc<dyn Publisher>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(publisher, rx, cancel));
        (Self { tx }, worker)
    }

    /// Messages waiting to be published.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[async_trait]
impl Publisher for PublishQueue {
    async fn publish(&self, channel: Channel, payload: String) -> Result<(), BusError> {
        self.tx
            .send(Outbound { channel, payload })
            .await
            .map_err(|_| BusError::QueueClosed)?;
        metrics::set_publish_queue_depth(self.depth());
        Ok(())
    }
}

async fn run_worker(
    publisher: Arc<dyn Publisher>,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) {
    tracing::debug!("Publish worker started");
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        metrics::set_publish_queue_depth(rx.len());

        let channel = message.channel;
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = publisher.publish(channel, message.payload) => {
                if let Err(e) = result {
                    tracing::error!(%channel, error = %e, "Message dropped");
                    metrics::record_publish_failure(channel.as_str());
                }
            }
        }
    }

    let abandoned = rx.len();
    if abandoned > 0 {
        tracing::warn!(abandoned, "Publish worker stopped with messages queued");
    }
    tracing::debug!("Publish worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::application::ports::MessageBus;
    use crate::application::retry::RetryConfig;
    use crate::infrastructure::bus::{InMemoryBus, RetryingBus};

    #[tokio::test]
    async fn preserves_order_across_channels() {
        let memory = Arc::new(InMemoryBus::default());
        let mut ticks = memory.subscribe("ticks").await.unwrap();
        let mut history = memory.subscribe("historicalPrices").await.unwrap();
        let cancel = CancellationToken::new();
        let (queue, worker) = PublishQueue::spawn(
            Arc::new(RetryingBus::new(
                Arc::clone(&memory) as Arc<dyn MessageBus>,
                RetryConfig::bus(),
            )),
            16,
            cancel.clone(),
        );

        queue.publish(Channel::HistoricalPrices, "ack".into()).await.unwrap();
        queue.publish(Channel::Ticks, "t1".into()).await.unwrap();
        queue.publish(Channel::HistoricalPrices, "segment".into()).await.unwrap();
        drop(queue);
        worker.await.unwrap();

        assert_eq!(history.next().await.unwrap().unwrap(), "ack");
        assert_eq!(history.next().await.unwrap().unwrap(), "segment");
        assert_eq!(ticks.next().await.unwrap().unwrap(), "t1");
    }

    #[tokio::test]
    async fn bus_outage_does_not_block_producers() {
        let memory = Arc::new(InMemoryBus::default());
        memory.fail_next_publishes(3);
        let mut stream = memory.subscribe("ticks").await.unwrap();
        let cancel = CancellationToken::new();
        let retry = RetryConfig::new(
            Duration::from_millis(20),
            Duration::from_millis(20),
            1.0,
            0.0,
            0,
        );
        let (queue, _worker) = PublishQueue::spawn(
            Arc::new(RetryingBus::new(Arc::clone(&memory) as Arc<dyn MessageBus>, retry)),
            16,
            cancel.clone(),
        );

        let enqueue = tokio::time::timeout(Duration::from_millis(10), async {
            for i in 0..5 {
                queue.publish(Channel::Ticks, i.to_string()).await.unwrap();
            }
        });
        enqueue.await.unwrap();

        for i in 0..5 {
            assert_eq!(stream.next().await.unwrap().unwrap(), i.to_string());
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn closed_queue_reports_error() {
        let cancel = CancellationToken::new();
        let (queue, worker) = PublishQueue::spawn(
            Arc::new(RetryingBus::new(
                Arc::new(InMemoryBus::default()),
                RetryConfig::bus(),
            )),
            4,
            cancel.clone(),
        );

        cancel.cancel();
        worker.await.unwrap();

        assert_eq!(
            queue.publish(Channel::Ticks, "late".into()).await,
            Err(BusError::QueueClosed)
        );
    }
}
