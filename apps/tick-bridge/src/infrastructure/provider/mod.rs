//! Market Data Provider Adapters
//!
//! Implementations of the `MarketDataProvider` port.

mod simulated;

pub use simulated::{REJECTED_USERNAME, SimulatedProvider, SimulatedProviderConfig};
