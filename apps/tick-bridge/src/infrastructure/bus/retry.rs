//! Retrying bus wrapper.
//!
//! Connection-level failures are retried from scratch with capped exponential
//! backoff. With the default unlimited budget a publish never gives up and a
//! subscription is re-established for as long as the bridge runs.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BusError, BusStream, Channel, InboundHandler, MessageBus, Publisher};
use crate::application::retry::{RetryConfig, RetryPolicy};
use crate::infrastructure::metrics;

/// [`MessageBus`] wrapper adding retry on connection failures.
#[derive(Clone)]
pub struct RetryingBus {
    inner: Arc<dyn MessageBus>,
    config: RetryConfig,
}

impl RetryingBus {
    /// Wrap a bus.
    #[must_use]
    pub fn new(inner: Arc<dyn MessageBus>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Publish, retrying connection failures.
    ///
    /// # Errors
    ///
    /// Returns non-connection errors immediately, and
    /// [`BusError::RetriesExhausted`] once a finite budget is spent.
    pub async fn publish_with_retry(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let mut policy = RetryPolicy::new(self.config.clone());
        loop {
            match self.inner.publish(channel, payload).await {
                Ok(()) => {
                    if policy.attempt_count() > 0 {
                        tracing::info!(channel, retries = policy.attempt_count(), "Publish recovered");
                    }
                    return Ok(());
                }
                Err(e) if e.is_connection() => {
                    let Some(delay) = policy.next_delay() else {
                        return Err(BusError::RetriesExhausted {
                            operation: "publish",
                            channel: channel.to_string(),
                            attempts: policy.attempt_count(),
                        });
                    };
                    tracing::warn!(
                        channel,
                        error = %e,
                        attempt = policy.attempt_count(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Publish failed, retrying"
                    );
                    metrics::record_publish_retry(channel);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Subscribe to a channel, retrying connection failures.
    ///
    /// # Errors
    ///
    /// Same as [`RetryingBus::publish_with_retry`].
    pub async fn subscribe(&self, channel: Channel) -> Result<Subscription, BusError> {
        let mut policy = RetryPolicy::new(self.config.clone());
        let stream = self.subscribe_with(&mut policy, channel).await?;
        policy.reset();
        Ok(Subscription {
            bus: self.clone(),
            channel,
            stream,
            policy,
        })
    }

    async fn subscribe_with(
        &self,
        policy: &mut RetryPolicy,
        channel: Channel,
    ) -> Result<BusStream, BusError> {
        loop {
            match self.inner.subscribe(channel.as_str()).await {
                Ok(stream) => {
                    tracing::info!(%channel, "Subscribed");
                    return Ok(stream);
                }
                Err(e) if e.is_connection() => Self::wait(policy, channel, &e).await?,
                Err(e) => return Err(e),
            }
        }
    }

    async fn wait(policy: &mut RetryPolicy, channel: Channel, error: &BusError) -> Result<(), BusError> {
        let Some(delay) = policy.next_delay() else {
            return Err(BusError::RetriesExhausted {
                operation: "subscribe",
                channel: channel.to_string(),
                attempts: policy.attempt_count(),
            });
        };
        tracing::warn!(
            %channel,
            error = %error,
            attempt = policy.attempt_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Subscription unavailable, retrying"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[async_trait]
impl Publisher for RetryingBus {
    async fn publish(&self, channel: Channel, payload: String) -> Result<(), BusError> {
        self.publish_with_retry(channel.as_str(), &payload).await
    }
}

impl std::fmt::Debug for RetryingBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingBus")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// An established subscription that re-establishes itself when it breaks.
pub struct Subscription {
    bus: RetryingBus,
    channel: Channel,
    stream: BusStream,
    policy: RetryPolicy,
}

impl Subscription {
    /// Feed payloads to `handler` one at a time until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error only if the subscription cannot be re-established:
    /// a non-connection failure, or an exhausted finite retry budget.
    pub async fn run(
        mut self,
        handler: Arc<dyn InboundHandler>,
        cancel: CancellationToken,
    ) -> Result<(), BusError> {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(channel = %self.channel, "Subscription cancelled");
                    return Ok(());
                }
                item = self.stream.next() => match item {
                    Some(Ok(payload)) => {
                        self.policy.reset();
                        handler.handle(&payload).await;
                    }
                    Some(Err(e)) if !e.is_connection() => {
                        tracing::warn!(channel = %self.channel, error = %e, "Subscription error");
                    }
                    Some(Err(e)) => {
                        tracing::warn!(channel = %self.channel, error = %e, "Subscription lost");
                        self.reconnect(&cancel).await?;
                    }
                    None => {
                        tracing::warn!(channel = %self.channel, "Subscription closed");
                        self.reconnect(&cancel).await?;
                    }
                },
            }
        }
    }

    async fn reconnect(&mut self, cancel: &CancellationToken) -> Result<(), BusError> {
        let lost = BusError::Connection("subscription stream ended".to_string());
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(()),
            result = async {
                RetryingBus::wait(&mut self.policy, self.channel, &lost).await?;
                self.bus.subscribe_with(&mut self.policy, self.channel).await
            } => {
                self.stream = result?;
                metrics::record_subscription_restart(self.channel);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
