//! Provider Session State Machine
//!
//! Tracks the lifecycle of the single provider session.
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──Connected status──► Connected
//!       ▲                         │  ▲                             │
//!       │                         │  └──Reconnecting/SessionLost───┘
//!       └──Disconnected status────┘
//!                                 └──login failed──► Failed (terminal)
//! ```
//!
//! Drops after login are expected to be recovered by the provider's own
//! reconnection, so they re-enter `Connecting` rather than `Failed`.

use serde::Serialize;

/// Bridge-side view of the provider session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session.
    #[default]
    Disconnected,
    /// Login in progress or provider reconnecting.
    Connecting,
    /// Session usable.
    Connected,
    /// Login rejected. Terminal.
    Failed,
}

impl SessionState {
    /// Whether provider requests may be issued.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Lowercase name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }

    /// Numeric code for the session state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Failed => 3.0,
        }
    }

    /// Apply a session event and return the next state.
    #[must_use]
    pub const fn apply(self, event: SessionEvent) -> Self {
        if self.is_terminal() {
            return self;
        }

        match event {
            SessionEvent::ConnectRequested => Self::Connecting,
            SessionEvent::LoginFailed => Self::Failed,
            SessionEvent::Status(status) => match status {
                SessionStatus::Connecting
                | SessionStatus::Reconnecting
                | SessionStatus::SessionLost => Self::Connecting,
                SessionStatus::Connected => Self::Connected,
                SessionStatus::Disconnecting | SessionStatus::Disconnected => Self::Disconnected,
            },
        }
    }
}

/// Status codes reported by the provider session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Login handshake in progress.
    Connecting,
    /// Session established.
    Connected,
    /// Provider is re-establishing a dropped session.
    Reconnecting,
    /// Provider lost the session and will try again.
    SessionLost,
    /// Logout in progress.
    Disconnecting,
    /// Session closed.
    Disconnected,
}

/// Inputs to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The bridge asked the provider to log in.
    ConnectRequested,
    /// Provider status change.
    Status(SessionStatus),
    /// Provider rejected the login.
    LoginFailed,
}
