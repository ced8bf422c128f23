//! Prometheus Metrics Module
//!
//! Exposes bridge metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Quotes forwarded and filtered
//! - **History**: Request outcomes, segments, full pages, provider failures
//! - **Bus**: Publish retries, failures, queue depth, subscription restarts
//! - **Session**: Session state and pending request gauges
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::ports::Channel;
use crate::domain::market::FailureKind;
use crate::domain::session::SessionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the existing handle.
///
/// # Errors
///
/// Returns `BuildError` if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "tick_bridge_ticks_forwarded_total",
        "Live quotes published on the ticks channel"
    );
    describe_counter!(
        "tick_bridge_ticks_filtered_total",
        "Offer updates not forwarded, by reason"
    );

    describe_counter!(
        "tick_bridge_history_requests_total",
        "Inbound history requests by outcome"
    );
    describe_counter!(
        "tick_bridge_segments_published_total",
        "Historical segments published"
    );
    describe_counter!(
        "tick_bridge_full_pages_total",
        "Segments that filled a whole page"
    );
    describe_counter!(
        "tick_bridge_provider_failures_total",
        "Snapshot request failures reported by the provider, by kind"
    );

    describe_counter!(
        "tick_bridge_publish_retries_total",
        "Publish attempts retried after a bus connection failure"
    );
    describe_counter!(
        "tick_bridge_publish_failures_total",
        "Messages dropped after the publish retry budget ran out"
    );
    describe_counter!(
        "tick_bridge_subscription_restarts_total",
        "Bus subscriptions re-established"
    );
    describe_gauge!(
        "tick_bridge_publish_queue_depth",
        "Messages waiting in the outbound publish queue"
    );

    describe_gauge!(
        "tick_bridge_session_state",
        "Provider session state (0 disconnected, 1 connecting, 2 connected, 3 failed)"
    );
    describe_gauge!(
        "tick_bridge_pending_requests",
        "History requests awaiting a provider answer"
    );

    describe_histogram!(
        "tick_bridge_request_dispatch_seconds",
        "Time from a valid inbound request to its submission"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why an offer update was not forwarded.
#[derive(Debug, Clone, Copy)]
pub enum TickFilter {
    /// Instrument not in the monitored set.
    Unmonitored,
    /// Bid or ask flagged invalid.
    InvalidQuote,
}

impl TickFilter {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Unmonitored => "unmonitored",
            Self::InvalidQuote => "invalid_quote",
        }
    }
}

/// Outcome of an inbound history request.
#[derive(Debug, Clone, Copy)]
pub enum RequestOutcome {
    /// Acknowledged and sent to the provider.
    Dispatched,
    /// Failed decoding or validation.
    Invalid,
    /// Request creation gave up or failed permanently.
    Dropped,
    /// Created and acknowledged but the send failed.
    SendFailed,
}

impl RequestOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Invalid => "invalid",
            Self::Dropped => "dropped",
            Self::SendFailed => "send_failed",
        }
    }
}

/// Record a forwarded tick.
pub fn record_tick_forwarded(pair: &str) {
    counter!("tick_bridge_ticks_forwarded_total", "pair" => pair.to_string()).increment(1);
}

/// Record an offer update that was not forwarded.
pub fn record_tick_filtered(reason: TickFilter) {
    counter!("tick_bridge_ticks_filtered_total", "reason" => reason.as_str()).increment(1);
}

/// Record an inbound history request outcome.
pub fn record_history_request(outcome: RequestOutcome) {
    counter!("tick_bridge_history_requests_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record a published segment.
pub fn record_segment_published(full_page: bool) {
    counter!("tick_bridge_segments_published_total").increment(1);
    if full_page {
        counter!("tick_bridge_full_pages_total").increment(1);
    }
}

/// Record a provider request failure.
pub fn record_provider_failure(kind: FailureKind) {
    counter!("tick_bridge_provider_failures_total", "kind" => kind.as_str()).increment(1);
}

/// Record a publish retry.
pub fn record_publish_retry(channel: &str) {
    counter!("tick_bridge_publish_retries_total", "channel" => channel.to_string()).increment(1);
}

/// Record a message dropped after the retry budget ran out.
pub fn record_publish_failure(channel: &str) {
    counter!("tick_bridge_publish_failures_total", "channel" => channel.to_string()).increment(1);
}

/// Record a re-established subscription.
pub fn record_subscription_restart(channel: Channel) {
    counter!("tick_bridge_subscription_restarts_total", "channel" => channel.as_str())
        .increment(1);
}

/// Update the publish queue depth.
#[allow(clippy::cast_precision_loss)]
pub fn set_publish_queue_depth(depth: usize) {
    gauge!("tick_bridge_publish_queue_depth").set(depth as f64);
}

/// Update the session state gauge.
pub fn set_session_state(state: SessionState) {
    gauge!("tick_bridge_session_state").set(state.as_gauge());
}

/// Update the pending request gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_pending_requests(count: usize) {
    gauge!("tick_bridge_pending_requests").set(count as f64);
}

/// Record how long dispatching a request took.
pub fn record_dispatch_duration(duration: Duration) {
    histogram!("tick_bridge_request_dispatch_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
