//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the bridge services and the port interfaces
//! that define how they reach the provider session and the message bus.

/// Port interfaces for external systems (provider session, message bus).
pub mod ports;

/// Backoff policy shared by the bus wrapper and request dispatch.
pub mod retry;

/// Bridge services: session, ticks, history requests and responses.
pub mod services;
