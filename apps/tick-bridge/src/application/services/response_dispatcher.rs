//! Snapshot response relay.

use std::sync::Arc;

use super::correlation::PendingRequests;
use crate::application::ports::{BusError, Channel, Publisher};
use crate::domain::market::{FailureKind, HistoryPoint, HistorySegment, ProviderRequestId};
use crate::infrastructure::codec::{self, CodecError, HistoryMessage};
use crate::infrastructure::metrics;

/// Relay failures.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Message could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Message could not be queued.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Publishes provider answers on `historicalPrices`.
pub struct ResponseDispatcher {
    publisher: Arc<dyn Publisher>,
    pending: Arc<PendingRequests>,
}

impl ResponseDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(publisher: Arc<dyn Publisher>, pending: Arc<PendingRequests>) -> Self {
        Self { publisher, pending }
    }

    /// Relay a completed snapshot, preceded by the full-page status when the
    /// page limit was hit.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] if a message could not be encoded or queued.
    pub async fn on_completed(
        &self,
        request_id: ProviderRequestId,
        rows: Vec<HistoryPoint>,
    ) -> Result<(), RelayError> {
        match self.pending.complete(&request_id) {
            Some(entry) => {
                tracing::debug!(%request_id, uuid = %entry.client_correlation_id, rows = rows.len(), "Snapshot completed");
            }
            None => tracing::warn!(%request_id, "Snapshot for unknown request, relaying anyway"),
        }

        let segment = HistorySegment::new(request_id, rows);
        let full_page = segment.is_full_page();

        if full_page {
            self.publish(&HistoryMessage::full_page()).await?;
        }
        self.publish(&HistoryMessage::segment(&segment)).await?;

        metrics::record_segment_published(full_page);
        Ok(())
    }

    /// Relay a failed snapshot. Only empty-range failures reach the bus.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] if the error message could not be encoded or
    /// queued.
    pub async fn on_failed(
        &self,
        request_id: ProviderRequestId,
        message: &str,
    ) -> Result<(), RelayError> {
        if self.pending.fail(&request_id).is_none() {
            tracing::warn!(%request_id, "Failure for unknown request");
        }

        let kind = FailureKind::classify(message);
        metrics::record_provider_failure(kind);

        match kind {
            FailureKind::UnsupportedScope => {
                tracing::info!(%request_id, "No ticks in requested range");
                self.publish(&HistoryMessage::no_ticks(request_id)).await
            }
            FailureKind::Other => {
                tracing::error!(%request_id, message, "Snapshot request failed");
                Ok(())
            }
        }
    }

    async fn publish(&self, message: &HistoryMessage) -> Result<(), RelayError> {
        let payload = codec::encode(message)?;
        self.publisher
            .publish(Channel::HistoricalPrices, payload)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for ResponseDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseDispatcher").finish_non_exhaustive()
    }
}
