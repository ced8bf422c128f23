#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Tick Bridge - Provider Session to Pub/Sub
//!
//! Holds a single FX market-data provider session and bridges it to a
//! pub/sub message bus: live quotes for monitored pairs go out on `ticks`,
//! historical snapshot requests arrive on `priceRequests` and their answers
//! go out on `historicalPrices`.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Market data and session types
//!   - `market`: quotes, timeframes, history requests and segments
//!   - `session`: provider session state machine
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: provider, bus and publisher interfaces
//!   - `services`: session, tick forwarding, history requests, responses
//!   - `retry`: exponential backoff policy
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `bus`: Redis and in-memory pub/sub, retry wrapper, publish queue
//!   - `codec`: JSON wire messages
//!   - `provider`: simulated provider session
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                  ProviderEvent        ┌──────────────┐
//! Provider ─────────────────────────────►  Dispatcher  ├──► ticks
//!    ▲                                  └──────┬───────┘
//!    │ snapshot requests                       └──────────► historicalPrices
//!    │
//!    └──── HistoryRequestHandler ◄──────────────────────── priceRequests
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market data and session types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Service wiring.
pub mod bridge;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{HistoryRequest, HistorySegment, OfferRow, Tick, Timeframe};
pub use domain::session::{SessionState, SessionStatus};

// Ports
pub use application::ports::{
    BusError, Channel, ConnectionMode, Credentials, MarketDataProvider, MessageBus, ProviderEvent,
};

// Wiring
pub use bridge::{Bridge, BridgeError, BridgeHandle};

// Infrastructure config
pub use infrastructure::config::{BridgeConfig, BusBackend, ConfigError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
