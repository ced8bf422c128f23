//! Domain Layer - Core bridge types and state machines.
//!
//! This layer contains the market data types relayed by the bridge and the
//! provider session state machine. Nothing here performs I/O.

/// Market data types (offers, ticks, timeframes, historical segments).
pub mod market;

/// Provider session lifecycle state machine.
pub mod session;
