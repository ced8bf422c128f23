//! Test doubles shared by the service unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::application::ports::{
    BusError, Channel, ConnectionMode, Credentials, MarketDataProvider, ProviderError, Publisher,
    SnapshotRequest,
};
use crate::domain::market::{ProviderRequestId, Timeframe};

/// Ordered log of side effects across doubles.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Publisher that records every message.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(Channel, String)>>,
    journal: Journal,
    fail: bool,
}

impl RecordingPublisher {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn all(&self) -> Vec<(Channel, String)> {
        self.messages.lock().clone()
    }

    pub fn on(&self, channel: Channel) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, channel: Channel, payload: String) -> Result<(), BusError> {
        if self.fail {
            return Err(BusError::QueueClosed);
        }
        self.journal.push(format!("publish {channel}"));
        self.messages.lock().push((channel, payload));
        Ok(())
    }
}

/// Provider with scripted request factory and send behavior.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    journal: Journal,
    factory_failures: AtomicU32,
    create_calls: AtomicU32,
    send_rejection: Mutex<Option<String>>,
    created: Mutex<Vec<SnapshotRequest>>,
    sent: Mutex<Vec<ProviderRequestId>>,
}

impl ScriptedProvider {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub fn fail_factory(&self, times: u32) {
        self.factory_failures.store(times, Ordering::SeqCst);
    }

    pub fn reject_send(&self, reason: &str) {
        *self.send_rejection.lock() = Some(reason.to_string());
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<SnapshotRequest> {
        self.created.lock().clone()
    }

    pub fn sent(&self) -> Vec<ProviderRequestId> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    async fn login(
        &self,
        _credentials: &Credentials,
        _endpoint: &str,
        _mode: ConnectionMode,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn subscribe_offers(&self) -> Result<(), ProviderError> {
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
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = self.factory_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.factory_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::FactoryUnavailable);
        }

        let request = SnapshotRequest {
            request_id: ProviderRequestId::new(format!("R{call}")),
            instrument: instrument.to_string(),
            timeframe,
            max_rows,
            start,
            end,
        };
        self.journal.push(format!("create {instrument}"));
        self.created.lock().push(request.clone());
        Ok(request)
    }

    async fn send_request(&self, request: &SnapshotRequest) -> Result<(), ProviderError> {
        if let Some(reason) = self.send_rejection.lock().clone() {
            return Err(ProviderError::Sdk(reason));
        }
        self.journal.push("send".to_string());
        self.sent.lock().push(request.request_id.clone());
        Ok(())
    }
}
