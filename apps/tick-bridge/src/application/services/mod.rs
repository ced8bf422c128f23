//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SessionManager`: Provider session lifecycle
//! - `TickForwarder`: Offer updates to `ticks`
//! - `HistoryRequestHandler`: `priceRequests` to provider snapshot requests
//! - `ResponseDispatcher`: Snapshot answers to `historicalPrices`
//! - `EventDispatcher`: Single consumer of provider events
//! - `PendingRequests`: Provider id to caller id correlation

mod correlation;
mod dispatcher;
mod history_requests;
mod response_dispatcher;
mod session;
mod tick_forwarder;

#[cfg(test)]
pub(crate) mod testing;

pub use correlation::{CorrelationError, PendingRequests};
pub use dispatcher::EventDispatcher;
pub use history_requests::{DispatchError, HistoryRequestHandler};
pub use response_dispatcher::{RelayError, ResponseDispatcher};
pub use session::{DEFAULT_POLL_INTERVAL, SessionError, SessionManager};
pub use tick_forwarder::{DEFAULT_MONITORED_PAIRS, TickForwarder};
