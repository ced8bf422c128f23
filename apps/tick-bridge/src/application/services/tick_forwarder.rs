//! Live quote forwarding.

use std::collections::HashSet;
use std::sync::Arc;

use crate::application::ports::{Channel, Publisher};
use crate::domain::market::{OfferRow, Tick};
use crate::infrastructure::codec::{self, TickMessage};
use crate::infrastructure::metrics::{self, TickFilter};

/// Instruments forwarded when none are configured.
pub const DEFAULT_MONITORED_PAIRS: [&str; 4] = ["USD/CAD", "EUR/USD", "EUR/JPY", "AUD/USD"];

/// Turns offer table updates for monitored instruments into `ticks` messages.
pub struct TickForwarder {
    monitored: HashSet<String>,
    publisher: Arc<dyn Publisher>,
}

impl TickForwarder {
    /// Create a forwarder for the given provider symbols.
    #[must_use]
    pub fn new<I, S>(monitored: I, publisher: Arc<dyn Publisher>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            monitored: monitored.into_iter().map(Into::into).collect(),
            publisher,
        }
    }

    /// Whether an instrument is forwarded.
    #[must_use]
    pub fn is_monitored(&self, instrument: &str) -> bool {
        self.monitored.contains(instrument)
    }

    /// Forward one offer update. Returns whether a tick was published.
    pub async fn on_offer(&self, row: &OfferRow) -> bool {
        let Some((bid, ask)) = row.quote() else {
            tracing::warn!(instrument = %row.instrument, "Offer update without valid bid/ask, skipped");
            metrics::record_tick_filtered(TickFilter::InvalidQuote);
            return false;
        };

        if !self.is_monitored(&row.instrument) {
            metrics::record_tick_filtered(TickFilter::Unmonitored);
            return false;
        }

        let tick = Tick::now(row.instrument.as_str(), bid, ask);
        let message = TickMessage::from(&tick);
        let payload = match codec::encode(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, pair = %message.pair, "Failed to encode tick");
                return false;
            }
        };

        if let Err(e) = self.publisher.publish(Channel::Ticks, payload).await {
            tracing::error!(error = %e, pair = %message.pair, "Failed to publish tick");
            return false;
        }

        tracing::trace!(pair = %message.pair, %bid, %ask, "Tick forwarded");
        metrics::record_tick_forwarded(&message.pair);
        true
    }
}

impl std::fmt::Debug for TickForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickForwarder")
            .field("monitored", &self.monitored)
            .finish_non_exhaustive()
    }
}
