//! Market data provider port.
//!
//! The provider SDK is callback driven. Adapters translate every callback into
//! a [`ProviderEvent`] sent on the channel handed to them at construction, so
//! the bridge consumes status changes, offer updates and request completions
//! from a single dispatcher instead of from provider threads.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::market::{HistoryPoint, OfferRow, ProviderRequestId, Timeframe};
use crate::domain::session::SessionStatus;

/// Provider account type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Demo account.
    #[default]
    Demo,
    /// Real account.
    Real,
}

impl ConnectionMode {
    /// Parse a mode, defaulting to `Demo`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "real" => Self::Real,
            _ => Self::Demo,
        }
    }

    /// Name passed to the provider login.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Demo => "Demo",
            Self::Real => "Real",
        }
    }
}

/// Provider login credentials.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    /// Get the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Callback from the provider, delivered as a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Session status changed.
    Status(SessionStatus),
    /// Login was rejected.
    LoginFailed {
        /// Provider reason.
        reason: String,
    },
    /// A row of the live offer table changed.
    OfferChanged(OfferRow),
    /// A snapshot request completed.
    RequestCompleted {
        /// Request id.
        request_id: ProviderRequestId,
        /// Snapshot rows in provider order.
        rows: Vec<HistoryPoint>,
    },
    /// A snapshot request failed.
    RequestFailed {
        /// Request id.
        request_id: ProviderRequestId,
        /// Provider failure text.
        message: String,
    },
}

/// A snapshot request built by the provider's request factory.
///
/// The id is assigned at creation, before the request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Provider-assigned id.
    pub request_id: ProviderRequestId,
    /// Instrument symbol.
    pub instrument: String,
    /// Bar timeframe.
    pub timeframe: Timeframe,
    /// Row cap for the response.
    pub max_rows: usize,
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end.
    pub end: DateTime<Utc>,
}

/// Errors returned synchronously by provider calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The session's request factory is momentarily unavailable, typically
    /// right after a reconnect.
    #[error("request factory unavailable")]
    FactoryUnavailable,

    /// The session is not connected.
    #[error("provider session not connected")]
    NotConnected,

    /// Instrument unknown to the provider.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Login was rejected before any status callback.
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// Any other SDK failure.
    #[error("provider error: {0}")]
    Sdk(String),
}

impl ProviderError {
    /// Whether resubmitting the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::FactoryUnavailable | Self::NotConnected)
    }
}

/// Provider session capability.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Start logging in. Progress is reported through status events.
    async fn login(
        &self,
        credentials: &Credentials,
        endpoint: &str,
        mode: ConnectionMode,
    ) -> Result<(), ProviderError>;

    /// Subscribe to live offer table updates.
    async fn subscribe_offers(&self) -> Result<(), ProviderError>;

    /// Build a snapshot request and obtain its id without sending it.
    async fn create_snapshot_request(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        max_rows: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SnapshotRequest, ProviderError>;

    /// Send a previously created request. The answer arrives as a
    /// `RequestCompleted` or `RequestFailed` event.
    async fn send_request(&self, request: &SnapshotRequest) -> Result<(), ProviderError>;
}
