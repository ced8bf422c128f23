//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Pub/sub adapters (Redis, in-memory) with retry and ordered publishing.
pub mod bus;

/// JSON wire messages for the pub/sub channels.
pub mod codec;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Market data provider adapters.
pub mod provider;

/// OpenTelemetry tracing integration.
pub mod telemetry;
