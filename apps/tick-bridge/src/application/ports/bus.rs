//! Message bus ports.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

/// Bus channels used by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Outbound live quotes.
    Ticks,
    /// Outbound acknowledgements, segments, statuses and errors.
    HistoricalPrices,
    /// Inbound history requests.
    PriceRequests,
}

impl Channel {
    /// Channel name on the bus.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticks => "ticks",
            Self::HistoricalPrices => "historicalPrices",
            Self::PriceRequests => "priceRequests",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by bus adapters and wrappers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Connection-level failure; the operation may be retried from scratch.
    #[error("bus connection failed: {0}")]
    Connection(String),

    /// Any other backend failure.
    #[error("bus backend error: {0}")]
    Backend(String),

    /// Retry limit reached.
    #[error("{operation} on {channel} gave up after {attempts} attempts")]
    RetriesExhausted {
        /// `publish` or `subscribe`.
        operation: &'static str,
        /// Channel name.
        channel: String,
        /// Attempts made.
        attempts: u32,
    },

    /// The outbound queue worker has stopped.
    #[error("publish queue closed")]
    QueueClosed,
}

impl BusError {
    /// Whether the failure is connection-level and worth retrying.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Stream of payloads received on a subscribed channel.
///
/// The stream ends or yields a connection error when the subscription breaks.
pub type BusStream = Pin<Box<dyn Stream<Item = Result<String, BusError>> + Send>>;

/// Raw pub/sub client.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one payload.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;

    /// Subscribe to a channel.
    async fn subscribe(&self, channel: &str) -> Result<BusStream, BusError>;
}

/// Outbound publishing used by the application services.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one encoded payload to a bridge channel.
    async fn publish(&self, channel: Channel, payload: String) -> Result<(), BusError>;
}

/// Consumer of inbound bus messages, called one message at a time.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle one payload. Failures are the handler's own concern.
    async fn handle(&self, payload: &str);
}
