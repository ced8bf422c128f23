//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketDataProvider`: the provider session (login, offers, snapshots)
//! - `MessageBus`: raw pub/sub client
//! - `Publisher`: outbound publishing as seen by the application services
//!
//! ## Driver Ports (Inbound)
//!
//! - `InboundHandler`: consumer of messages arriving on a bus channel
//! - `ProviderEvent`: provider callbacks delivered as channel messages

mod bus;
mod provider;

pub use bus::{BusError, BusStream, Channel, InboundHandler, MessageBus, Publisher};
pub use provider::{
    ConnectionMode, Credentials, MarketDataProvider, ProviderError, ProviderEvent, SnapshotRequest,
};
