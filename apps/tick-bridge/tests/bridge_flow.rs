//! Bridge Flow Integration Tests
//!
//! Runs the full bridge against the simulated provider and the in-memory bus.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tick_bridge::application::ports::BusStream;
use tick_bridge::application::retry::RetryConfig;
use tick_bridge::infrastructure::bus::InMemoryBus;
use tick_bridge::infrastructure::codec::{
    self, FULL_PAGE_STATUS, HistoryMessage, HistoryReply, NO_TICKS_IN_RANGE, PriceRequestMessage,
};
use tick_bridge::infrastructure::provider::{
    REJECTED_USERNAME, SimulatedProvider, SimulatedProviderConfig,
};
use tick_bridge::{
    Bridge, BridgeConfig, BridgeError, BridgeHandle, Credentials, MessageBus, OfferRow,
    ProviderEvent, SessionState, SessionStatus,
};

const WAIT: Duration = Duration::from_secs(2);
const JAN_1_2021_MS: i64 = 1_609_459_200_000;

struct Harness {
    bus: Arc<InMemoryBus>,
    provider: Arc<SimulatedProvider>,
    handle: BridgeHandle,
    ticks: BusStream,
    history: BusStream,
}

fn config(username: &str) -> BridgeConfig {
    let mut config = BridgeConfig::new(Credentials::new(username.into(), "secret".into()));
    config.provider.poll_interval = Duration::from_millis(5);
    config.bus.retry = RetryConfig::new(
        Duration::from_millis(5),
        Duration::from_millis(20),
        2.0,
        0.0,
        0,
    );
    config
}

fn provider(
    events: mpsc::Sender<ProviderEvent>,
    cancel: CancellationToken,
) -> Arc<SimulatedProvider> {
    Arc::new(SimulatedProvider::new(
        SimulatedProviderConfig {
            instruments: ["USD/CAD", "EUR/USD", "EUR/JPY", "AUD/USD", "GBP/USD"]
                .map(String::from)
                .to_vec(),
            tick_interval: Duration::from_secs(3600),
        },
        events,
        cancel,
    ))
}

async fn start() -> Harness {
    let bus = Arc::new(InMemoryBus::default());
    let ticks = bus.subscribe("ticks").await.unwrap();
    let history = bus.subscribe("historicalPrices").await.unwrap();

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(256);
    let provider = provider(tx, cancel.clone());

    let bridge = Bridge::new(
        config("trader"),
        Arc::clone(&provider) as _,
        Arc::clone(&bus) as _,
    );
    let handle = timeout(WAIT, bridge.start(rx, cancel)).await.unwrap().unwrap();

    Harness {
        bus,
        provider,
        handle,
        ticks,
        history,
    }
}

async fn request(bus: &InMemoryBus, pair: &str, resolution: &str, minutes: i64, uuid: &str) {
    let payload = codec::encode_price_request(&PriceRequestMessage {
        pair: pair.to_string(),
        start_time: JAN_1_2021_MS,
        end_time: JAN_1_2021_MS + minutes * 60_000,
        resolution: resolution.to_string(),
        uuid: uuid.to_string(),
    })
    .unwrap();
    bus.publish("priceRequests", &payload).await.unwrap();
}

async fn next_history(stream: &mut BusStream) -> HistoryMessage {
    let payload = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    codec::decode(&payload).unwrap()
}

fn expect_ack(message: HistoryMessage) -> (String, String) {
    match message {
        HistoryMessage::Reply(HistoryReply::SegmentId { id, uuid }) => {
            (id.as_str().to_string(), uuid)
        }
        other => panic!("expected acknowledgement, got {other:?}"),
    }
}

#[tokio::test]
async fn session_reaches_connected() {
    let harness = start().await;

    assert_eq!(*harness.handle.session().borrow(), SessionState::Connected);

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn rejected_login_stops_startup() {
    let bus = Arc::new(InMemoryBus::default());
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(16);
    let provider = provider(tx, cancel.clone());

    let bridge = Bridge::new(config(REJECTED_USERNAME), provider as _, bus as _);
    let session = bridge.session();
    let err = timeout(WAIT, bridge.start(rx, cancel)).await.unwrap().unwrap_err();

    assert!(matches!(err, BridgeError::Session(_)));
    assert_eq!(*session.borrow(), SessionState::Failed);
}

#[tokio::test]
async fn monitored_quotes_are_forwarded() {
    let mut harness = start().await;

    harness
        .provider
        .inject(ProviderEvent::OfferChanged(OfferRow::new(
            "GBP/USD",
            Decimal::new(127_001, 5),
            Decimal::new(127_016, 5),
        )))
        .await
        .unwrap();
    harness
        .provider
        .inject(ProviderEvent::OfferChanged(OfferRow::new(
            "EUR/USD",
            Decimal::new(108_512, 5),
            Decimal::new(108_527, 5),
        )))
        .await
        .unwrap();

    let tick = loop {
        let payload = timeout(WAIT, harness.ticks.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let tick: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_ne!(tick["pair"], "gbpusd");
        if tick["bid"].as_f64() == Some(1.08512) {
            break tick;
        }
    };

    assert_eq!(tick["real"], true);
    assert_eq!(tick["pair"], "eurusd");
    assert_eq!(tick["ask"].as_f64(), Some(1.08527));
    assert!(tick["timestamp"].as_f64().unwrap() > 1.6e9);

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn history_request_is_acknowledged_then_answered() {
    let mut harness = start().await;

    request(&harness.bus, "EUR/USD", "m1", 120, "req-1").await;

    let (ack_id, uuid) = expect_ack(next_history(&mut harness.history).await);
    assert_eq!(uuid, "req-1");

    match next_history(&mut harness.history).await {
        HistoryMessage::Reply(HistoryReply::Segment { id, data }) => {
            assert_eq!(id.as_str(), ack_id);
            assert_eq!(data.len(), 120);
            assert_eq!(data.last().unwrap().timestamp, JAN_1_2021_MS + 120 * 60_000);
            assert!(data.windows(2).all(|w| w[1].timestamp - w[0].timestamp == 60_000));
        }
        other => panic!("expected segment, got {other:?}"),
    }

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn full_page_is_flagged_before_the_segment() {
    let mut harness = start().await;

    request(&harness.bus, "USD/CAD", "m1", 1_000, "req-2").await;

    let (ack_id, _) = expect_ack(next_history(&mut harness.history).await);
    assert_eq!(
        next_history(&mut harness.history).await,
        HistoryMessage::Status {
            status: FULL_PAGE_STATUS.to_string()
        }
    );
    match next_history(&mut harness.history).await {
        HistoryMessage::Reply(HistoryReply::Segment { id, data }) => {
            assert_eq!(id.as_str(), ack_id);
            assert_eq!(data.len(), 300);
        }
        other => panic!("expected segment, got {other:?}"),
    }

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn empty_window_reports_no_ticks() {
    let mut harness = start().await;

    request(&harness.bus, "AUD/USD", "H1", 0, "req-3").await;

    let (ack_id, _) = expect_ack(next_history(&mut harness.history).await);
    match next_history(&mut harness.history).await {
        HistoryMessage::Error { error, id } => {
            assert_eq!(error, NO_TICKS_IN_RANGE);
            assert_eq!(id.as_str(), ack_id);
        }
        other => panic!("expected error, got {other:?}"),
    }

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn other_provider_failures_publish_nothing_more() {
    let mut harness = start().await;
    harness.provider.fail_next_request("request timed out");

    request(&harness.bus, "EUR/JPY", "m5", 60, "req-4").await;
    let _ack = expect_ack(next_history(&mut harness.history).await);

    let quiet = timeout(Duration::from_millis(200), harness.history.next()).await;
    assert!(quiet.is_err());

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn malformed_requests_do_not_stop_the_subscription() {
    let mut harness = start().await;

    harness.bus.publish("priceRequests", "not json").await.unwrap();
    harness.bus.publish("priceRequests", "[]").await.unwrap();
    request(&harness.bus, "EUR/USD", "m1", 10, "req-5").await;

    let (_, uuid) = expect_ack(next_history(&mut harness.history).await);
    assert_eq!(uuid, "req-5");

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn requests_wait_out_a_provider_reconnect() {
    let mut harness = start().await;
    harness
        .provider
        .inject(ProviderEvent::Status(SessionStatus::Reconnecting))
        .await
        .unwrap();
    let mut session = harness.handle.session();
    timeout(WAIT, session.wait_for(|s| *s == SessionState::Connecting))
        .await
        .unwrap()
        .unwrap();

    request(&harness.bus, "EUR/USD", "m1", 30, "req-6").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    harness
        .provider
        .inject(ProviderEvent::Status(SessionStatus::Connected))
        .await
        .unwrap();

    let (_, uuid) = expect_ack(next_history(&mut harness.history).await);
    assert_eq!(uuid, "req-6");

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn bus_outage_delays_but_does_not_lose_replies() {
    let mut harness = start().await;
    request(&harness.bus, "EUR/USD", "m1", 5, "req-7").await;
    harness.bus.fail_next_publishes(4);

    let (ack_id, uuid) = expect_ack(next_history(&mut harness.history).await);
    assert_eq!(uuid, "req-7");
    match next_history(&mut harness.history).await {
        HistoryMessage::Reply(HistoryReply::Segment { id, data }) => {
            assert_eq!(id.as_str(), ack_id);
            assert_eq!(data.len(), 5);
        }
        other => panic!("expected segment, got {other:?}"),
    }

    harness.handle.shutdown().await;
}
