//! Provider event loop.
//!
//! Single consumer of the provider event channel. Events are handled strictly
//! in arrival order; terminal correlation entries are pruned on a timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::correlation::PendingRequests;
use super::response_dispatcher::ResponseDispatcher;
use super::session::SessionManager;
use super::tick_forwarder::TickForwarder;
use crate::application::ports::ProviderEvent;

/// How often terminal correlation entries are swept.
const PRUNE_INTERVAL: Duration = Duration::from_secs(30);

/// Routes provider events to the session, tick and response services.
pub struct EventDispatcher {
    session: Arc<SessionManager>,
    ticks: TickForwarder,
    responses: ResponseDispatcher,
    pending: Arc<PendingRequests>,
    retention: Duration,
}

impl EventDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub const fn new(
        session: Arc<SessionManager>,
        ticks: TickForwarder,
        responses: ResponseDispatcher,
        pending: Arc<PendingRequests>,
        retention: Duration,
    ) -> Self {
        Self {
            session,
            ticks,
            responses,
            pending,
            retention,
        }
    }

    /// Consume events until the channel closes or `cancel` fires.
    pub async fn run(self, mut events: mpsc::Receiver<ProviderEvent>, cancel: CancellationToken) {
        let mut prune = tokio::time::interval(PRUNE_INTERVAL);
        prune.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!("Event dispatcher started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => {
                        tracing::warn!("Provider event channel closed");
                        break;
                    }
                },
                _ = prune.tick() => {
                    let removed = self.pending.prune_terminal(self.retention);
                    if removed > 0 {
                        tracing::debug!(removed, "Pruned resolved requests");
                    }
                }
            }
        }
        tracing::debug!("Event dispatcher stopped");
    }

    /// Handle one event.
    pub async fn dispatch(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::Status(status) => self.session.on_status(status),
            ProviderEvent::LoginFailed { reason } => self.session.on_login_failed(&reason),
            ProviderEvent::OfferChanged(row) => {
                self.ticks.on_offer(&row).await;
            }
            ProviderEvent::RequestCompleted { request_id, rows } => {
                if let Err(e) = self.responses.on_completed(request_id.clone(), rows).await {
                    tracing::error!(%request_id, error = %e, "Failed to relay snapshot");
                }
            }
            ProviderEvent::RequestFailed {
                request_id,
                message,
            } => {
                if let Err(e) = self.responses.on_failed(request_id.clone(), &message).await {
                    tracing::error!(%request_id, error = %e, "Failed to relay snapshot failure");
                }
            }
        }
    }
}
