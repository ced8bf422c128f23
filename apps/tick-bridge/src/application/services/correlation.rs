//! Pending request correlation.
//!
//! Shared between the inbound request path, which records entries, and the
//! event dispatcher, which resolves them. Resolved entries stay in the map in
//! a terminal state until [`PendingRequests::prune_terminal`] removes them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::domain::market::{PendingRequest, PendingState, ProviderRequestId};
use crate::infrastructure::metrics;

/// Correlation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    /// The provider id is already mapped.
    #[error("request {0} is already pending")]
    Duplicate(ProviderRequestId),
}

/// Provider request id to caller correlation id map.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: RwLock<HashMap<ProviderRequestId, PendingRequest>>,
}

impl PendingRequests {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly issued request.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Duplicate`] if the id is already present,
    /// leaving the existing entry untouched.
    pub fn insert(&self, request: PendingRequest) -> Result<(), CorrelationError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&request.provider_request_id) {
            return Err(CorrelationError::Duplicate(request.provider_request_id));
        }
        entries.insert(request.provider_request_id.clone(), request);
        metrics::set_pending_requests(count_issued(&entries));
        Ok(())
    }

    /// Mark a request completed. Returns the entry, or `None` if unknown.
    pub fn complete(&self, id: &ProviderRequestId) -> Option<PendingRequest> {
        self.resolve(id, PendingState::Completed)
    }

    /// Mark a request failed. Returns the entry, or `None` if unknown.
    pub fn fail(&self, id: &ProviderRequestId) -> Option<PendingRequest> {
        self.resolve(id, PendingState::Failed)
    }

    /// Snapshot of one entry.
    #[must_use]
    pub fn get(&self, id: &ProviderRequestId) -> Option<PendingRequest> {
        self.entries.read().get(id).cloned()
    }

    /// Drop terminal entries resolved more than `retention` ago.
    pub fn prune_terminal(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry
                .resolved_at
                .is_none_or(|resolved| now.saturating_duration_since(resolved) < retention)
        });
        before - entries.len()
    }

    /// Requests still awaiting an answer.
    #[must_use]
    pub fn issued_count(&self) -> usize {
        count_issued(&self.entries.read())
    }

    /// All tracked entries, terminal ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn resolve(&self, id: &ProviderRequestId, outcome: PendingState) -> Option<PendingRequest> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(id)?;
        if !entry.state.is_terminal() {
            entry.state = outcome;
            entry.resolved_at = Some(Instant::now());
        }
        let resolved = entry.clone();
        metrics::set_pending_requests(count_issued(&entries));
        Some(resolved)
    }
}

fn count_issued(entries: &HashMap<ProviderRequestId, PendingRequest>) -> usize {
    entries
        .values()
        .filter(|entry| entry.state == PendingState::Issued)
        .count()
}
