//! Bridge Configuration Settings
//!
//! Configuration types for the tick bridge, loaded from environment variables.

use std::time::Duration;

use crate::application::ports::{ConnectionMode, Credentials};
use crate::application::retry::RetryConfig;
use crate::application::services::{DEFAULT_MONITORED_PAIRS, DEFAULT_POLL_INTERVAL};

/// Default provider host list endpoint.
pub const DEFAULT_HOST_URL: &str = "http://www.fxcorporate.com/Hosts.jsp";

/// Pub/sub backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusBackend {
    /// Redis pub/sub.
    #[default]
    Redis,
    /// In-process bus, for local runs without Redis.
    Memory,
}

impl BusBackend {
    /// Parse backend from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" => Self::Memory,
            _ => Self::Redis,
        }
    }

    /// Get the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

/// Provider session settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Login credentials.
    pub credentials: Credentials,
    /// Host list endpoint.
    pub host_url: String,
    /// Demo or real account.
    pub mode: ConnectionMode,
    /// Interval between session state checks while connecting.
    pub poll_interval: Duration,
    /// Simulated quote cadence.
    pub tick_interval: Duration,
}

/// Pub/sub settings.
#[derive(Debug, Clone)]
pub struct BusSettings {
    /// Selected backend.
    pub backend: BusBackend,
    /// Redis host.
    pub redis_host: String,
    /// Redis port.
    pub redis_port: u16,
    /// Backoff for connection-level bus failures.
    pub retry: RetryConfig,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            redis_host: "127.0.0.1".to_string(),
            redis_port: 6379,
            retry: RetryConfig::bus(),
        }
    }
}

/// Internal channel and bookkeeping settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Provider event channel capacity.
    pub event_capacity: usize,
    /// Outbound publish queue capacity.
    pub publish_capacity: usize,
    /// How long completed or failed requests stay in the pending table.
    pub pending_retention: Duration,
    /// Backoff while the provider's request factory is unavailable.
    pub request_retry: RetryConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            event_capacity: 4096,
            publish_capacity: 4096,
            pending_retention: Duration::from_secs(600),
            request_retry: RetryConfig::request(),
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Provider session settings.
    pub provider: ProviderSettings,
    /// Instruments whose quotes are forwarded.
    pub monitored_pairs: Vec<String>,
    /// Pub/sub settings.
    pub bus: BusSettings,
    /// Internal pipeline settings.
    pub pipeline: PipelineSettings,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl BridgeConfig {
    /// Configuration with defaults for everything but the credentials.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            provider: ProviderSettings {
                credentials,
                host_url: DEFAULT_HOST_URL.to_string(),
                mode: ConnectionMode::default(),
                poll_interval: DEFAULT_POLL_INTERVAL,
                tick_interval: Duration::from_millis(250),
            },
            monitored_pairs: DEFAULT_MONITORED_PAIRS.iter().map(ToString::to_string).collect(),
            bus: BusSettings::default(),
            pipeline: PipelineSettings::default(),
            health_port: 8083,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = required_env("PROVIDER_USERNAME")?;
        let password = required_env("PROVIDER_PASSWORD")?;

        let mut config = Self::new(Credentials::new(username, password));

        if let Ok(url) = std::env::var("PROVIDER_HOST_URL")
            && !url.is_empty()
        {
            config.provider.host_url = url;
        }
        config.provider.mode = std::env::var("PROVIDER_CONNECTION")
            .map(|s| ConnectionMode::from_str_case_insensitive(&s))
            .unwrap_or_default();
        config.provider.poll_interval =
            parse_env_duration_millis("BRIDGE_SESSION_POLL_MS", config.provider.poll_interval);
        config.provider.tick_interval =
            parse_env_duration_millis("SIMULATED_TICK_INTERVAL_MS", config.provider.tick_interval);

        if let Ok(pairs) = std::env::var("MONITORED_PAIRS") {
            let pairs = parse_pairs(&pairs);
            if pairs.is_empty() {
                return Err(ConfigError::EmptyValue("MONITORED_PAIRS".to_string()));
            }
            config.monitored_pairs = pairs;
        }

        config.bus.backend = std::env::var("BUS_BACKEND")
            .map(|s| BusBackend::from_str_case_insensitive(&s))
            .unwrap_or_default();
        if let Ok(host) = std::env::var("REDIS_HOST")
            && !host.is_empty()
        {
            config.bus.redis_host = host;
        }
        config.bus.redis_port = parse_env_u16("REDIS_PORT", config.bus.redis_port);
        config.bus.retry = parse_env_retry("BRIDGE_BUS_RETRY", &config.bus.retry);

        config.pipeline.event_capacity =
            parse_env_usize("BRIDGE_EVENT_CAPACITY", config.pipeline.event_capacity);
        config.pipeline.publish_capacity =
            parse_env_usize("BRIDGE_PUBLISH_CAPACITY", config.pipeline.publish_capacity);
        config.pipeline.pending_retention = parse_env_duration_secs(
            "BRIDGE_PENDING_RETENTION_SECS",
            config.pipeline.pending_retention,
        );
        config.pipeline.request_retry =
            parse_env_retry("BRIDGE_REQUEST_RETRY", &config.pipeline.request_retry);

        config.health_port = parse_env_u16("BRIDGE_HEALTH_PORT", config.health_port);

        Ok(config)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    let value = std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_pairs(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// Reads `{prefix}_INITIAL_MS`, `_MAX_MS`, `_MULTIPLIER` and `_MAX_ATTEMPTS`.
fn parse_env_retry(prefix: &str, default: &RetryConfig) -> RetryConfig {
    RetryConfig {
        initial_delay: parse_env_duration_millis(&format!("{prefix}_INITIAL_MS"), default.initial_delay),
        max_delay: parse_env_duration_millis(&format!("{prefix}_MAX_MS"), default.max_delay),
        multiplier: parse_env_multiplier(&format!("{prefix}_MULTIPLIER"), default.multiplier),
        jitter_factor: default.jitter_factor,
        max_attempts: parse_env_u32(&format!("{prefix}_MAX_ATTEMPTS"), default.max_attempts),
    }
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn parse_env_multiplier(key: &str, default: f64) -> f64 {
    multiplier_or(std::env::var(key).ok().as_deref(), default)
}

/// Backoff must not shrink: NaN, infinities and factors below 1 are ignored.
fn multiplier_or(raw: Option<&str>, default: f64) -> f64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 1.0)
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    millis_or(std::env::var(key).ok().as_deref(), default)
}

/// Zero is ignored; every millisecond setting is a period or a backoff step.
fn millis_or(raw: Option<&str>, default: Duration) -> Duration {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map_or(default, Duration::from_millis)
}
