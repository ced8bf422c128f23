//! Bridge wiring.
//!
//! Builds the services around one provider and one bus and starts them in
//! order: publish queue, event dispatcher, session login, offer subscription,
//! then the `priceRequests` subscription.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    BusError, Channel, InboundHandler, MarketDataProvider, MessageBus, ProviderError,
    ProviderEvent, Publisher,
};
use crate::application::services::{
    EventDispatcher, HistoryRequestHandler, PendingRequests, ResponseDispatcher, SessionError,
    SessionManager, TickForwarder,
};
use crate::domain::session::SessionState;
use crate::infrastructure::bus::{PublishQueue, RetryingBus};
use crate::infrastructure::config::BridgeConfig;

/// Bridge startup errors.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Login rejected by the provider.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Offer subscription could not be opened.
    #[error("offer subscription failed: {0}")]
    Offers(#[from] ProviderError),
    /// The request channel could not be subscribed.
    #[error("request subscription failed: {0}")]
    Subscribe(#[from] BusError),
    /// Shutdown was requested before the bridge finished starting.
    #[error("cancelled during startup")]
    Cancelled,
}

/// Services sharing one provider session.
pub struct Bridge {
    config: BridgeConfig,
    provider: Arc<dyn MarketDataProvider>,
    bus: Arc<dyn MessageBus>,
    session: Arc<SessionManager>,
    pending: Arc<PendingRequests>,
}

impl Bridge {
    /// Create a bridge over `provider` and `bus`.
    #[must_use]
    pub fn new(
        config: BridgeConfig,
        provider: Arc<dyn MarketDataProvider>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(
            Arc::clone(&provider),
            config.provider.poll_interval,
        ));
        Self {
            config,
            provider,
            bus,
            session,
            pending: Arc::new(PendingRequests::new()),
        }
    }

    /// Session state updates.
    #[must_use]
    pub fn session(&self) -> watch::Receiver<SessionState> {
        self.session.watch()
    }

    /// Pending request table.
    #[must_use]
    pub fn pending(&self) -> Arc<PendingRequests> {
        Arc::clone(&self.pending)
    }

    /// Start every service and log in.
    ///
    /// `events` must be the receiving end of the channel the provider reports
    /// on. Returns once the session is connected and the request subscription
    /// is live.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if login is rejected, the offer table cannot be
    /// subscribed, the request channel cannot be subscribed, or `cancel` fires
    /// first. Services already started are stopped before returning.
    pub async fn start(
        self,
        events: mpsc::Receiver<ProviderEvent>,
        cancel: CancellationToken,
    ) -> Result<BridgeHandle, BridgeError> {
        let token = cancel.child_token();
        let mut tasks = Vec::new();

        let retrying = RetryingBus::new(Arc::clone(&self.bus), self.config.bus.retry.clone());
        let (queue, worker) = PublishQueue::spawn(
            Arc::new(retrying.clone()),
            self.config.pipeline.publish_capacity,
            token.clone(),
        );
        tasks.push(worker);
        let publisher: Arc<dyn Publisher> = Arc::new(queue);

        let dispatcher = EventDispatcher::new(
            Arc::clone(&self.session),
            TickForwarder::new(self.config.monitored_pairs.iter(), Arc::clone(&publisher)),
            ResponseDispatcher::new(Arc::clone(&publisher), Arc::clone(&self.pending)),
            Arc::clone(&self.pending),
            self.config.pipeline.pending_retention,
        );
        tasks.push(tokio::spawn(dispatcher.run(events, token.clone())));

        let startup = async {
            let provider = &self.config.provider;
            self.session
                .connect(&provider.credentials, &provider.host_url, provider.mode)
                .await?;
            self.provider.subscribe_offers().await?;
            tracing::info!(pairs = ?self.config.monitored_pairs, "Offer subscription open");
            Ok::<_, BridgeError>(retrying.subscribe(Channel::PriceRequests).await?)
        };

        let subscription = tokio::select! {
            biased;
            () = token.cancelled() => Err(BridgeError::Cancelled),
            result = startup => result,
        };
        let subscription = match subscription {
            Ok(subscription) => subscription,
            Err(e) => {
                token.cancel();
                for task in tasks {
                    let _ = task.await;
                }
                return Err(e);
            }
        };

        let handler: Arc<dyn InboundHandler> = Arc::new(HistoryRequestHandler::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.session),
            publisher,
            Arc::clone(&self.pending),
            self.config.pipeline.request_retry.clone(),
        ));
        let requests_token = token.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = subscription.run(handler, requests_token.clone()).await {
                tracing::error!(error = %e, "Request subscription stopped");
                requests_token.cancel();
            }
        }));

        tracing::info!("Bridge started");
        Ok(BridgeHandle {
            session: self.session.watch(),
            cancel: token,
            tasks,
        })
    }
}

/// Running bridge.
pub struct BridgeHandle {
    session: watch::Receiver<SessionState>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Session state updates.
    #[must_use]
    pub fn session(&self) -> watch::Receiver<SessionState> {
        self.session.clone()
    }

    /// Resolves when the bridge stops on its own or is cancelled.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await;
    }

    /// Stop every service and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Bridge task ended abnormally");
            }
        }
        tracing::info!("Bridge stopped");
    }
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("session", &*self.session.borrow())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
