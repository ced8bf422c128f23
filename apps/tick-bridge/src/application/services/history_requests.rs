//! Inbound history request handling.
//!
//! Each `priceRequests` message is decoded, turned into a provider snapshot
//! request, recorded for correlation and acknowledged on `historicalPrices`
//! before it is sent, so the acknowledgement always precedes the data.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::correlation::{CorrelationError, PendingRequests};
use super::session::SessionManager;
use crate::application::ports::{
    BusError, Channel, InboundHandler, MarketDataProvider, ProviderError, Publisher,
    SnapshotRequest,
};
use crate::application::retry::{RetryConfig, RetryPolicy};
use crate::domain::market::{
    HistoryRequest, PendingRequest, ProviderRequestId, SNAPSHOT_PAGE_SIZE,
};
use crate::infrastructure::codec::{self, CodecError, HistoryMessage};
use crate::infrastructure::metrics::{self, RequestOutcome};

/// Reasons a valid request did not reach the provider.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Transient provider failures outlasted the retry budget.
    #[error("gave up after {attempts} retries: {last}")]
    RetriesExhausted {
        /// Retries made.
        attempts: u32,
        /// Last failure seen.
        last: ProviderError,
    },

    /// Non-transient provider failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Provider reused an id that is still tracked.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// Acknowledgement could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Acknowledgement could not be queued.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Acknowledged, but the provider would not take the request.
    #[error("request {id} acknowledged but not sent: {reason}")]
    NotSent {
        /// Provider request id.
        id: ProviderRequestId,
        /// Send failure.
        reason: String,
    },
}

/// Handles `priceRequests` messages.
pub struct HistoryRequestHandler {
    provider: Arc<dyn MarketDataProvider>,
    session: Arc<SessionManager>,
    publisher: Arc<dyn Publisher>,
    pending: Arc<PendingRequests>,
    retry: RetryConfig,
}

impl HistoryRequestHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        session: Arc<SessionManager>,
        publisher: Arc<dyn Publisher>,
        pending: Arc<PendingRequests>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            provider,
            session,
            publisher,
            pending,
            retry,
        }
    }

    /// Create, record, acknowledge and send one validated request.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the request could not be created, recorded,
    /// acknowledged or sent. A send failure after the acknowledgement marks the
    /// pending entry failed.
    #[tracing::instrument(
        skip(self, request),
        fields(pair = %request.pair, timeframe = %request.timeframe, uuid = %request.client_correlation_id)
    )]
    pub async fn dispatch(&self, request: HistoryRequest) -> Result<ProviderRequestId, DispatchError> {
        let started = Instant::now();

        let snapshot = self.create_with_retry(&request).await?;
        let id = snapshot.request_id.clone();

        self.pending.insert(PendingRequest::issued(
            id.clone(),
            request.client_correlation_id.clone(),
        ))?;

        let ack = codec::encode(&HistoryMessage::ack(
            id.clone(),
            request.client_correlation_id,
        ))?;
        if let Err(e) = self.publisher.publish(Channel::HistoricalPrices, ack).await {
            self.pending.fail(&id);
            return Err(e.into());
        }

        if let Err(e) = self.send_with_retry(&snapshot).await {
            self.pending.fail(&id);
            return Err(DispatchError::NotSent {
                id,
                reason: e.to_string(),
            });
        }

        metrics::record_dispatch_duration(started.elapsed());
        tracing::info!(request_id = %id, "History request sent");
        Ok(id)
    }

    async fn create_with_retry(
        &self,
        request: &HistoryRequest,
    ) -> Result<SnapshotRequest, DispatchError> {
        let mut policy = RetryPolicy::new(self.retry.clone());
        loop {
            let result = if self.session.is_ready() {
                self.provider
                    .create_snapshot_request(
                        &request.pair,
                        request.timeframe,
                        SNAPSHOT_PAGE_SIZE,
                        request.start_time,
                        request.end_time,
                    )
                    .await
            } else {
                Err(ProviderError::NotConnected)
            };

            match result {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_transient() => Self::backoff(&mut policy, e, "create").await?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn send_with_retry(&self, snapshot: &SnapshotRequest) -> Result<(), DispatchError> {
        let mut policy = RetryPolicy::new(self.retry.clone());
        loop {
            match self.provider.send_request(snapshot).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => Self::backoff(&mut policy, e, "send").await?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn backoff(
        policy: &mut RetryPolicy,
        error: ProviderError,
        step: &'static str,
    ) -> Result<(), DispatchError> {
        let Some(delay) = policy.next_delay() else {
            return Err(DispatchError::RetriesExhausted {
                attempts: policy.attempt_count(),
                last: error,
            });
        };
        tracing::debug!(
            step,
            error = %error,
            attempt = policy.attempt_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Provider not ready, retrying"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[async_trait]
impl InboundHandler for HistoryRequestHandler {
    async fn handle(&self, payload: &str) {
        let request = match codec::decode_history_request(payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, payload, "Dropping malformed history request");
                metrics::record_history_request(RequestOutcome::Invalid);
                return;
            }
        };

        match self.dispatch(request).await {
            Ok(_) => metrics::record_history_request(RequestOutcome::Dispatched),
            Err(e @ DispatchError::NotSent { .. }) => {
                tracing::error!(error = %e, "History request failed after acknowledgement");
                metrics::record_history_request(RequestOutcome::SendFailed);
            }
            Err(e) => {
                tracing::error!(error = %e, "Dropping history request");
                metrics::record_history_request(RequestOutcome::Dropped);
            }
        }
    }
}

impl std::fmt::Debug for HistoryRequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRequestHandler")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::services::testing::{Journal, RecordingPublisher, ScriptedProvider};
    use crate::domain::market::{PendingState, Timeframe};
    use crate::domain::session::SessionStatus;
    use crate::infrastructure::codec::decode;

    const REQUEST: &str = r#"[{"pair":"EUR/USD","startTime":1609459200000,"endTime":1609466400000,"resolution":"m1","uuid":"abc-123"}]"#;

    struct Fixture {
        journal: Journal,
        provider: Arc<ScriptedProvider>,
        publisher: Arc<RecordingPublisher>,
        pending: Arc<PendingRequests>,
        session: Arc<SessionManager>,
        handler: HistoryRequestHandler,
    }

    fn fixture(connected: bool) -> Fixture {
        let journal = Journal::default();
        let provider = Arc::new(ScriptedProvider::with_journal(journal.clone()));
        let publisher = Arc::new(RecordingPublisher::with_journal(journal.clone()));
        let pending = Arc::new(PendingRequests::new());
        let session = Arc::new(SessionManager::new(
            Arc::clone(&provider) as Arc<dyn MarketDataProvider>,
            Duration::from_millis(5),
        ));
        if connected {
            session.on_status(SessionStatus::Connected);
        }
        let retry = RetryConfig::new(
            Duration::from_millis(1),
            Duration::from_millis(4),
            2.0,
            0.0,
            3,
        );
        let handler = HistoryRequestHandler::new(
            Arc::clone(&provider) as Arc<dyn MarketDataProvider>,
            Arc::clone(&session),
            Arc::clone(&publisher) as Arc<dyn Publisher>,
            Arc::clone(&pending),
            retry,
        );
        Fixture {
            journal,
            provider,
            publisher,
            pending,
            session,
            handler,
        }
    }

    #[tokio::test]
    async fn valid_request_is_acknowledged_then_sent() {
        let fx = fixture(true);

        fx.handler.handle(REQUEST).await;

        let created = fx.provider.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].instrument, "EUR/USD");
        assert_eq!(created[0].timeframe, Timeframe::Minute1);
        assert_eq!(created[0].max_rows, 300);
        assert_eq!(created[0].start.timestamp_millis(), 1_609_459_200_000);
        assert_eq!(created[0].end.timestamp_millis(), 1_609_466_400_000);

        let id = created[0].request_id.clone();
        let acks = fx.publisher.on(Channel::HistoricalPrices);
        assert_eq!(acks.len(), 1);
        assert_eq!(
            decode::<HistoryMessage>(&acks[0]).unwrap(),
            HistoryMessage::ack(id.clone(), "abc-123".into())
        );

        assert_eq!(fx.provider.sent(), vec![id.clone()]);
        let entry = fx.pending.get(&id).unwrap();
        assert_eq!(entry.client_correlation_id, "abc-123");
        assert_eq!(entry.state, PendingState::Issued);
    }

    #[tokio::test]
    async fn ack_is_published_before_send() {
        let fx = fixture(true);

        fx.handler.handle(REQUEST).await;

        assert_eq!(
            fx.journal.entries(),
            ["create EUR/USD", "publish historicalPrices", "send"]
        );
    }

    #[tokio::test]
    async fn malformed_requests_are_dropped_silently() {
        let fx = fixture(true);

        for payload in [
            "garbage",
            "[]",
            r#"[{"pair":"EUR/USD","startTime":10,"endTime":5,"resolution":"m1","uuid":"u"}]"#,
            r#"[{"pair":"EUR/USD","startTime":0,"endTime":5,"resolution":"x7","uuid":"u"}]"#,
            r#"[{"pair":"","startTime":0,"endTime":5,"resolution":"m1","uuid":"u"}]"#,
        ] {
            fx.handler.handle(payload).await;
        }

        assert!(fx.provider.created().is_empty());
        assert!(fx.publisher.all().is_empty());
        assert!(fx.pending.is_empty());
    }

    #[tokio::test]
    async fn factory_unavailable_is_retried() {
        let fx = fixture(true);
        fx.provider.fail_factory(2);

        fx.handler.handle(REQUEST).await;

        assert_eq!(fx.provider.create_calls(), 3);
        assert_eq!(fx.provider.sent().len(), 1);
        assert_eq!(fx.publisher.on(Channel::HistoricalPrices).len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_drop_the_request() {
        let fx = fixture(true);
        fx.provider.fail_factory(100);

        fx.handler.handle(REQUEST).await;

        assert_eq!(fx.provider.create_calls(), 4);
        assert!(fx.publisher.all().is_empty());
        assert!(fx.pending.is_empty());
    }

    #[tokio::test]
    async fn disconnected_session_never_reaches_the_factory() {
        let fx = fixture(false);

        let result = fx
            .handler
            .dispatch(HistoryRequest::from_millis("EUR/USD", "m1", 0, 60_000, "u").unwrap())
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::RetriesExhausted { attempts: 3, last: ProviderError::NotConnected })
        ));
        assert_eq!(fx.provider.create_calls(), 0);
        assert!(fx.publisher.all().is_empty());
    }

    #[tokio::test]
    async fn request_waits_out_a_reconnect() {
        let mut fx = fixture(false);
        fx.handler.retry = RetryConfig::new(
            Duration::from_millis(1),
            Duration::from_millis(4),
            2.0,
            0.0,
            100,
        );
        let session = Arc::clone(&fx.session);

        let reconnect = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.on_status(SessionStatus::Connected);
        });

        let id = fx
            .handler
            .dispatch(HistoryRequest::from_millis("EUR/USD", "m1", 0, 60_000, "u").unwrap())
            .await
            .unwrap();
        reconnect.await.unwrap();

        assert_eq!(fx.provider.sent(), vec![id]);
    }

    #[tokio::test]
    async fn permanent_send_failure_marks_pending_failed() {
        let fx = fixture(true);
        fx.provider.reject_send("instrument disabled");

        fx.handler.handle(REQUEST).await;

        let id = fx.provider.created()[0].request_id.clone();
        assert_eq!(fx.publisher.on(Channel::HistoricalPrices).len(), 1);
        assert_eq!(fx.pending.get(&id).unwrap().state, PendingState::Failed);
    }
}
