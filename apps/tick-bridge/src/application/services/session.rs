//! Provider session lifecycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::application::ports::{ConnectionMode, Credentials, MarketDataProvider};
use crate::domain::session::{SessionEvent, SessionState, SessionStatus};
use crate::infrastructure::metrics;

/// Default interval between session state checks while connecting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shortest accepted poll interval. Tokio intervals reject a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The provider rejected the login. Not retried.
    #[error("provider login failed: {0}")]
    LoginFailed(String),
}

/// Owns the session state machine and drives login.
///
/// State changes come from two places: [`SessionManager::connect`] and the
/// provider status events routed in by the event dispatcher. Everything else
/// observes the state through [`SessionManager::watch`].
pub struct SessionManager {
    provider: Arc<dyn MarketDataProvider>,
    state: watch::Sender<SessionState>,
    failure: Mutex<Option<String>>,
    poll_interval: Duration,
}

impl SessionManager {
    /// Create a manager in the `Disconnected` state.
    ///
    /// `poll_interval` is raised to at least one millisecond.
    #[must_use]
    pub fn new(provider: Arc<dyn MarketDataProvider>, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            provider,
            state,
            failure: Mutex::new(None),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether provider requests may be issued.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Log in and wait until the session is usable.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LoginFailed`] when the provider rejects the
    /// login, either synchronously or through a later event.
    #[tracing::instrument(skip(self, credentials), fields(user = credentials.username(), mode = mode.as_str()))]
    pub async fn connect(
        &self,
        credentials: &Credentials,
        endpoint: &str,
        mode: ConnectionMode,
    ) -> Result<(), SessionError> {
        self.apply(SessionEvent::ConnectRequested);

        if let Err(e) = self.provider.login(credentials, endpoint, mode).await {
            self.on_login_failed(&e.to_string());
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            match self.state() {
                SessionState::Connected => {
                    tracing::info!(endpoint, "Provider session established");
                    return Ok(());
                }
                SessionState::Failed => {
                    let reason = self
                        .failure
                        .lock()
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(SessionError::LoginFailed(reason));
                }
                SessionState::Disconnected | SessionState::Connecting => {}
            }
        }
    }

    /// Apply a provider status event.
    pub fn on_status(&self, status: SessionStatus) {
        let next = self.apply(SessionEvent::Status(status));
        if matches!(status, SessionStatus::Reconnecting | SessionStatus::SessionLost) {
            tracing::warn!(?status, state = next.as_str(), "Provider session interrupted");
        }
    }

    /// Apply a login rejection.
    pub fn on_login_failed(&self, reason: &str) {
        tracing::error!(reason, "Provider login failed");
        self.failure.lock().get_or_insert_with(|| reason.to_string());
        self.apply(SessionEvent::LoginFailed);
    }

    fn apply(&self, event: SessionEvent) -> SessionState {
        let mut previous = SessionState::default();
        self.state.send_if_modified(|state| {
            previous = *state;
            *state = state.apply(event);
            *state != previous
        });

        let next = self.state();
        if next != previous {
            tracing::info!(from = previous.as_str(), to = next.as_str(), "Session state changed");
            metrics::set_session_state(next);
        }
        next
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
