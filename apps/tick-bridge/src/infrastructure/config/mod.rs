//! Configuration Module
//!
//! Configuration loading for the bridge service.

mod settings;

pub use settings::{
    BridgeConfig, BusBackend, BusSettings, ConfigError, DEFAULT_HOST_URL, PipelineSettings,
    ProviderSettings,
};
