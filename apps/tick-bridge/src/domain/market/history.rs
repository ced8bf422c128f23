//! Historical snapshot request and response types.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timeframe;

/// Maximum number of rows the provider returns for one snapshot request.
///
/// A response with exactly this many rows may have been truncated.
pub const SNAPSHOT_PAGE_SIZE: usize = 300;

/// Failure text the provider uses when a window holds no data it can serve.
const UNSUPPORTED_SCOPE: &str = "unsupported scope";

// =============================================================================
// Errors
// =============================================================================

/// Reasons an inbound history request is rejected before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Instrument symbol was empty.
    #[error("pair cannot be empty")]
    EmptyPair,

    /// Caller correlation id was empty.
    #[error("request uuid cannot be empty")]
    EmptyCorrelationId,

    /// Resolution is not a provider timeframe code.
    #[error("unknown resolution: {0}")]
    UnknownResolution(String),

    /// Epoch milliseconds outside the representable range.
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),

    /// Window end precedes its start.
    #[error("end time {end} precedes start time {start}")]
    InvertedWindow {
        /// Start, epoch millis.
        start: i64,
        /// End, epoch millis.
        end: i64,
    },
}

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier the provider assigns to an accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderRequestId(String);

impl ProviderRequestId {
    /// Wrap a provider id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderRequestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// =============================================================================
// Request
// =============================================================================

/// A validated request for a window of historical prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Provider instrument symbol, e.g. `EUR/USD`.
    pub pair: String,
    /// Bar timeframe.
    pub timeframe: Timeframe,
    /// Window start.
    pub start_time: DateTime<Utc>,
    /// Window end.
    pub end_time: DateTime<Utc>,
    /// Caller-supplied id echoed in the acknowledgement.
    pub client_correlation_id: String,
}

impl HistoryRequest {
    /// Validate raw request fields.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when a field is empty, the resolution is
    /// unknown, a timestamp is unrepresentable, or the window is inverted.
    pub fn from_millis(
        pair: &str,
        resolution: &str,
        start_millis: i64,
        end_millis: i64,
        client_correlation_id: &str,
    ) -> Result<Self, RequestError> {
        if pair.trim().is_empty() {
            return Err(RequestError::EmptyPair);
        }
        if client_correlation_id.is_empty() {
            return Err(RequestError::EmptyCorrelationId);
        }

        let timeframe = resolution.parse::<Timeframe>()?;
        let start_time = millis_to_datetime(start_millis)?;
        let end_time = millis_to_datetime(end_millis)?;

        if end_time < start_time {
            return Err(RequestError::InvertedWindow {
                start: start_millis,
                end: end_millis,
            });
        }

        Ok(Self {
            pair: pair.to_string(),
            timeframe,
            start_time,
            end_time,
            client_correlation_id: client_correlation_id.to_string(),
        })
    }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, RequestError> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or(RequestError::TimestampOutOfRange(millis))
}

// =============================================================================
// Response
// =============================================================================

/// One bar of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPoint {
    /// Provider bar timestamp.
    pub timestamp: DateTime<Utc>,
    /// Bid price.
    pub bid: Decimal,
    /// Ask price.
    pub ask: Decimal,
}

/// Snapshot rows answering one provider request, in provider order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySegment {
    /// Request this segment answers.
    pub request_id: ProviderRequestId,
    /// Rows, oldest first.
    pub points: Vec<HistoryPoint>,
}

impl HistorySegment {
    /// Create a segment.
    #[must_use]
    pub const fn new(request_id: ProviderRequestId, points: Vec<HistoryPoint>) -> Self {
        Self { request_id, points }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the segment has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the segment filled a whole page, meaning the window may hold
    /// more rows than were returned.
    #[must_use]
    pub fn is_full_page(&self) -> bool {
        self.points.len() == SNAPSHOT_PAGE_SIZE
    }
}

/// Classification of a provider request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The window is outside the range the provider can serve.
    UnsupportedScope,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Classify a provider failure message.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        if message.contains(UNSUPPORTED_SCOPE) {
            Self::UnsupportedScope
        } else {
            Self::Other
        }
    }

    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedScope => "unsupported_scope",
            Self::Other => "other",
        }
    }
}

// =============================================================================
// Correlation
// =============================================================================

/// Lifecycle of a dispatched request. Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Sent to the provider, no answer yet.
    Issued,
    /// Provider delivered a snapshot.
    Completed,
    /// Provider reported a failure.
    Failed,
}

impl PendingState {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Maps a provider request id back to the caller's correlation id.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Provider-assigned id.
    pub provider_request_id: ProviderRequestId,
    /// Caller-supplied id.
    pub client_correlation_id: String,
    /// Current lifecycle state.
    pub state: PendingState,
    /// When the request was recorded.
    pub issued_at: Instant,
    /// When the request reached a terminal state.
    pub resolved_at: Option<Instant>,
}

impl PendingRequest {
    /// Record a freshly issued request.
    #[must_use]
    pub fn issued(provider_request_id: ProviderRequestId, client_correlation_id: String) -> Self {
        Self {
            provider_request_id,
            client_correlation_id,
            state: PendingState::Issued,
            issued_at: Instant::now(),
            resolved_at: None,
        }
    }
}
