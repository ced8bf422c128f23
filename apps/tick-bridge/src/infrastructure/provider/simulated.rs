//! Simulated FX provider.
//!
//! Stands in for the vendor session: login reports status transitions, the
//! offer table is a random walk per instrument, and snapshot requests return
//! synthetic bars. Every callback is delivered on the provider event channel,
//! the same way a real session adapter would deliver SDK callbacks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{
    ConnectionMode, Credentials, MarketDataProvider, ProviderError, ProviderEvent, SnapshotRequest,
};
use crate::domain::market::{HistoryPoint, OfferRow, ProviderRequestId, Timeframe};
use crate::domain::session::SessionStatus;

/// Username that makes the simulated login fail.
pub const REJECTED_USERNAME: &str = "simulate-login-failure";

/// Failure text for windows holding no bars.
const UNSUPPORTED_SCOPE: &str = "unsupported scope: no data in requested range";

/// Simulated provider settings.
#[derive(Debug, Clone)]
pub struct SimulatedProviderConfig {
    /// Instruments known to the provider.
    pub instruments: Vec<String>,
    /// Delay between offer updates.
    pub tick_interval: Duration,
}

impl Default for SimulatedProviderConfig {
    fn default() -> Self {
        Self {
            instruments: [
                "USD/CAD", "EUR/USD", "EUR/JPY", "AUD/USD", "GBP/USD", "USD/JPY",
            ]
            .map(String::from)
            .to_vec(),
            tick_interval: Duration::from_millis(250),
        }
    }
}

/// In-process [`MarketDataProvider`].
pub struct SimulatedProvider {
    config: SimulatedProviderConfig,
    events: mpsc::Sender<ProviderEvent>,
    cancel: CancellationToken,
    connected: AtomicBool,
    offers_started: AtomicBool,
    factory_failures: AtomicU32,
    snapshot_rows: Mutex<Option<usize>>,
    next_failure: Mutex<Option<String>>,
    prices: Arc<Mutex<HashMap<String, Decimal>>>,
}

impl SimulatedProvider {
    /// Create a provider that reports on `events` and stops background work on
    /// `cancel`.
    #[must_use]
    pub fn new(
        config: SimulatedProviderConfig,
        events: mpsc::Sender<ProviderEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let prices = config
            .instruments
            .iter()
            .map(|instrument| (instrument.clone(), opening_price(instrument)))
            .collect();
        Self {
            config,
            events,
            cancel,
            connected: AtomicBool::new(false),
            offers_started: AtomicBool::new(false),
            factory_failures: AtomicU32::new(0),
            snapshot_rows: Mutex::new(None),
            next_failure: Mutex::new(None),
            prices: Arc::new(Mutex::new(prices)),
        }
    }

    /// Deliver an arbitrary event, as if the provider had raised it.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Sdk`] if the event channel is closed.
    pub async fn inject(&self, event: ProviderEvent) -> Result<(), ProviderError> {
        if let ProviderEvent::Status(status) = &event {
            self.connected
                .store(*status == SessionStatus::Connected, Ordering::SeqCst);
        }
        self.emit(event).await
    }

    /// Make the request factory unavailable for the next `calls` requests.
    pub fn fail_factory(&self, calls: u32) {
        self.factory_failures.store(calls, Ordering::SeqCst);
    }

    /// Force the number of rows in every snapshot; `None` restores the
    /// window-derived count.
    pub fn set_snapshot_rows(&self, rows: Option<usize>) {
        *self.snapshot_rows.lock() = rows;
    }

    /// Fail the next sent request with `message`.
    pub fn fail_next_request(&self, message: &str) {
        *self.next_failure.lock() = Some(message.to_string());
    }

    async fn emit(&self, event: ProviderEvent) -> Result<(), ProviderError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ProviderError::Sdk("event channel closed".to_string()))
    }

    fn row_count(&self, request: &SnapshotRequest) -> usize {
        if let Some(rows) = *self.snapshot_rows.lock() {
            return rows.min(request.max_rows);
        }
        let span = request.end - request.start;
        let bar = request.timeframe.bar_length();
        let bars = span.num_milliseconds() / bar.num_milliseconds().max(1);
        usize::try_from(bars).unwrap_or(0).min(request.max_rows)
    }

    fn opening(&self, instrument: &str) -> Decimal {
        self.prices
            .lock()
            .get(instrument)
            .copied()
            .unwrap_or_else(|| opening_price(instrument))
    }
}

#[async_trait]
impl MarketDataProvider for SimulatedProvider {
    async fn login(
        &self,
        credentials: &Credentials,
        endpoint: &str,
        mode: ConnectionMode,
    ) -> Result<(), ProviderError> {
        tracing::info!(endpoint, mode = mode.as_str(), user = credentials.username(), "Simulated login");
        self.emit(ProviderEvent::Status(SessionStatus::Connecting)).await?;

        if credentials.username().is_empty()
            || credentials.password().is_empty()
            || credentials.username() == REJECTED_USERNAME
        {
            return self
                .emit(ProviderEvent::LoginFailed {
                    reason: "invalid user name or password".to_string(),
                })
                .await;
        }

        self.connected.store(true, Ordering::SeqCst);
        self.emit(ProviderEvent::Status(SessionStatus::Connected)).await
    }

    async fn subscribe_offers(&self) -> Result<(), ProviderError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ProviderError::NotConnected);
        }
        if self.offers_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let instruments = self.config.instruments.clone();
        if instruments.is_empty() {
            return Ok(());
        }

        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let prices = Arc::clone(&self.prices);
        let mut ticker =
            tokio::time::interval(self.config.tick_interval.max(Duration::from_millis(1)));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let row = {
                    let mut prices = prices.lock();
                    next_offer(&instruments, &mut prices)
                };
                if events.send(ProviderEvent::OfferChanged(row)).await.is_err() {
                    break;
                }
            }
            tracing::debug!("Simulated offer feed stopped");
        });
        Ok(())
    }

    async fn create_snapshot_request(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        max_rows: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SnapshotRequest, ProviderError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ProviderError::NotConnected);
        }
        if self
            .factory_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::FactoryUnavailable);
        }
        if !self.config.instruments.iter().any(|i| i == instrument) {
            return Err(ProviderError::UnknownInstrument(instrument.to_string()));
        }

        Ok(SnapshotRequest {
            request_id: ProviderRequestId::new(Uuid::new_v4().to_string()),
            instrument: instrument.to_string(),
            timeframe,
            max_rows,
            start,
            end,
        })
    }

    async fn send_request(&self, request: &SnapshotRequest) -> Result<(), ProviderError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ProviderError::NotConnected);
        }

        let request_id = request.request_id.clone();
        let forced_failure = self.next_failure.lock().take();
        let rows = self.row_count(request);

        let event = match forced_failure {
            Some(message) => ProviderEvent::RequestFailed {
                request_id,
                message,
            },
            None if rows == 0 => ProviderEvent::RequestFailed {
                request_id,
                message: UNSUPPORTED_SCOPE.to_string(),
            },
            None => ProviderEvent::RequestCompleted {
                request_id,
                rows: synthetic_bars(
                    self.opening(&request.instrument),
                    request.end,
                    request.timeframe.bar_length(),
                    rows,
                ),
            },
        };

        // Answers arrive asynchronously, after the caller has moved on.
        let events = self.events.clone();
        tokio::spawn(async move {
            if events.send(event).await.is_err() {
                tracing::warn!("Dropped snapshot answer, event channel closed");
            }
        });
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedProvider")
            .field("config", &self.config)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Price generation
// =============================================================================

fn opening_price(instrument: &str) -> Decimal {
    match instrument {
        "USD/CAD" => Decimal::new(135_000, 5),
        "EUR/USD" => Decimal::new(108_500, 5),
        "EUR/JPY" => Decimal::new(160_500, 3),
        "AUD/USD" => Decimal::new(65_500, 5),
        "GBP/USD" => Decimal::new(127_000, 5),
        "USD/JPY" => Decimal::new(149_800, 3),
        _ => Decimal::ONE,
    }
}

fn pip(price: Decimal) -> Decimal {
    if price > Decimal::from(20) {
        Decimal::new(1, 3)
    } else {
        Decimal::new(1, 5)
    }
}

fn spread(price: Decimal) -> Decimal {
    pip(price) * Decimal::from(15)
}

fn walk(price: Decimal, rng: &mut impl Rng) -> Decimal {
    let step: i64 = rng.random_range(-10..=10);
    let next = price + pip(price) * Decimal::from(step);
    if next > Decimal::ZERO { next } else { price }
}

fn next_offer(instruments: &[String], prices: &mut HashMap<String, Decimal>) -> OfferRow {
    let mut rng = rand::rng();
    let instrument = &instruments[rng.random_range(0..instruments.len())];
    let price = prices
        .entry(instrument.clone())
        .or_insert_with(|| opening_price(instrument));
    *price = walk(*price, &mut rng);
    OfferRow::new(instrument.as_str(), *price, *price + spread(*price))
}

fn synthetic_bars(
    opening: Decimal,
    end: DateTime<Utc>,
    bar: TimeDelta,
    rows: usize,
) -> Vec<HistoryPoint> {
    let mut rng = rand::rng();
    let mut price = opening;
    let mut bars: Vec<HistoryPoint> = (0..rows)
        .map(|back| {
            price = walk(price, &mut rng);
            HistoryPoint {
                timestamp: end - bar * i32::try_from(back).unwrap_or(i32::MAX),
                bid: price,
                ask: price + spread(price),
            }
        })
        .collect();
    bars.reverse();
    bars
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn provider() -> (SimulatedProvider, mpsc::Receiver<ProviderEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let config = SimulatedProviderConfig {
            tick_interval: Duration::from_millis(1),
            ..SimulatedProviderConfig::default()
        };
        (SimulatedProvider::new(config, tx, CancellationToken::new()), rx)
    }

    fn creds(user: &str) -> Credentials {
        Credentials::new(user.to_string(), "secret".to_string())
    }

    fn window(minutes: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.timestamp_millis_opt(1_609_459_200_000).unwrap();
        (start, start + TimeDelta::minutes(minutes))
    }

    #[tokio::test]
    async fn login_reports_connecting_then_connected() {
        let (provider, mut rx) = provider();

        provider
            .login(&creds("trader"), "http://host", ConnectionMode::Demo)
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            ProviderEvent::Status(SessionStatus::Connecting)
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ProviderEvent::Status(SessionStatus::Connected)
        );
    }

    #[tokio::test]
    async fn rejected_login_reports_failure() {
        let (provider, mut rx) = provider();

        provider
            .login(&creds(REJECTED_USERNAME), "http://host", ConnectionMode::Demo)
            .await
            .unwrap();

        let _connecting = rx.recv().await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProviderEvent::LoginFailed { .. }
        ));
    }

    #[tokio::test]
    async fn offers_need_a_session() {
        let (provider, _rx) = provider();
        assert_err!(provider.subscribe_offers().await);
    }

    #[tokio::test]
    async fn requests_need_a_session() {
        let (provider, _rx) = provider();
        let (start, end) = window(10);

        let err = provider
            .create_snapshot_request("EUR/USD", Timeframe::Minute1, 300, start, end)
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::NotConnected);
    }

    #[tokio::test]
    async fn snapshot_rows_follow_the_window() {
        let (provider, mut rx) = provider();
        provider
            .login(&creds("trader"), "http://host", ConnectionMode::Demo)
            .await
            .unwrap();
        let (start, end) = window(120);

        let request = provider
            .create_snapshot_request("EUR/USD", Timeframe::Minute1, 300, start, end)
            .await
            .unwrap();
        provider.send_request(&request).await.unwrap();

        let _ = rx.recv().await;
        let _ = rx.recv().await;
        let ProviderEvent::RequestCompleted { request_id, rows } = rx.recv().await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(request_id, request.request_id);
        assert_eq!(rows.len(), 120);
        assert_eq!(rows.last().unwrap().timestamp, end);
        assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(rows.iter().all(|r| r.ask > r.bid));
    }

    #[tokio::test]
    async fn long_windows_are_capped_at_max_rows() {
        let (provider, _rx) = provider();
        provider.inject(ProviderEvent::Status(SessionStatus::Connected)).await.unwrap();
        let (start, end) = window(10_000);

        let request = provider
            .create_snapshot_request("USD/CAD", Timeframe::Minute1, 300, start, end)
            .await
            .unwrap();

        assert_eq!(provider.row_count(&request), 300);
    }

    #[tokio::test]
    async fn empty_window_is_unsupported_scope() {
        let (provider, mut rx) = provider();
        provider.inject(ProviderEvent::Status(SessionStatus::Connected)).await.unwrap();
        let _ = rx.recv().await;
        let (start, _) = window(0);

        let request = provider
            .create_snapshot_request("USD/CAD", Timeframe::Hour1, 300, start, start)
            .await
            .unwrap();
        provider.send_request(&request).await.unwrap();

        let ProviderEvent::RequestFailed { message, .. } = rx.recv().await.unwrap() else {
            panic!("expected failure");
        };
        assert!(message.contains("unsupported scope"));
    }

    #[tokio::test]
    async fn factory_failures_are_consumed() {
        let (provider, _rx) = provider();
        provider.inject(ProviderEvent::Status(SessionStatus::Connected)).await.unwrap();
        provider.fail_factory(1);
        let (start, end) = window(5);

        assert_eq!(
            provider
                .create_snapshot_request("EUR/USD", Timeframe::Minute1, 300, start, end)
                .await
                .unwrap_err(),
            ProviderError::FactoryUnavailable
        );
        assert_ok!(
            provider
                .create_snapshot_request("EUR/USD", Timeframe::Minute1, 300, start, end)
                .await
        );
        assert_eq!(
            provider
                .create_snapshot_request("XAU/XAG", Timeframe::Minute1, 300, start, end)
                .await
                .unwrap_err(),
            ProviderError::UnknownInstrument("XAU/XAG".into())
        );
    }

    #[tokio::test]
    async fn offer_feed_emits_known_instruments() {
        let (provider, mut rx) = provider();
        provider.inject(ProviderEvent::Status(SessionStatus::Connected)).await.unwrap();
        let _ = rx.recv().await;

        provider.subscribe_offers().await.unwrap();

        for _ in 0..5 {
            let ProviderEvent::OfferChanged(row) = rx.recv().await.unwrap() else {
                panic!("expected offer");
            };
            assert!(provider.config.instruments.contains(&row.instrument));
            let (bid, ask) = row.quote().unwrap();
            assert!(ask > bid);
        }
        provider.cancel.cancel();
    }
}
