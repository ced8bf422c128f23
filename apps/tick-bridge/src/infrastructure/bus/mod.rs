//! Message Bus Adapters
//!
//! - `RedisBus`: Redis pub/sub
//! - `InMemoryBus`: in-process pub/sub for local runs and tests
//! - `RetryingBus`: connection retry around either backend
//! - `PublishQueue`: ordered, non-blocking outbound publishing

mod memory;
mod queue;
mod redis_bus;
mod retry;

pub use memory::{DEFAULT_CAPACITY, InMemoryBus};
pub use queue::PublishQueue;
pub use redis_bus::RedisBus;
pub use retry::{RetryingBus, Subscription};
