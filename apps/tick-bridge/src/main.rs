//! Tick Bridge Binary
//!
//! Starts the provider session bridge.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tick-bridge
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `PROVIDER_USERNAME`: provider login
//! - `PROVIDER_PASSWORD`: provider password
//!
//! ## Optional
//! - `PROVIDER_HOST_URL`: host list endpoint (default: <http://www.fxcorporate.com/Hosts.jsp>)
//! - `PROVIDER_CONNECTION`: Demo | Real (default: Demo)
//! - `MONITORED_PAIRS`: comma separated instruments (default: USD/CAD,EUR/USD,EUR/JPY,AUD/USD)
//! - `BUS_BACKEND`: redis | memory (default: redis)
//! - `REDIS_HOST` / `REDIS_PORT`: pub/sub endpoint (default: 127.0.0.1:6379)
//! - `BRIDGE_HEALTH_PORT`: health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log filter (default: `tick_bridge=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tick_bridge::application::ports::MessageBus;
use tick_bridge::infrastructure::bus::{InMemoryBus, RedisBus};
use tick_bridge::infrastructure::health::{HealthServer, HealthServerState};
use tick_bridge::infrastructure::provider::{SimulatedProvider, SimulatedProviderConfig};
use tick_bridge::infrastructure::telemetry;
use tick_bridge::{Bridge, BridgeConfig, BusBackend, init_metrics};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init().context("telemetry setup failed")?;

    tracing::info!("Starting Tick Bridge");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = BridgeConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let bus: Arc<dyn MessageBus> = match config.bus.backend {
        BusBackend::Redis => Arc::new(
            RedisBus::new(&config.bus.redis_host, config.bus.redis_port)
                .context("invalid Redis endpoint")?,
        ),
        BusBackend::Memory => Arc::new(InMemoryBus::default()),
    };

    let (events_tx, events_rx) = mpsc::channel(config.pipeline.event_capacity);
    let mut universe = SimulatedProviderConfig::default();
    universe.tick_interval = config.provider.tick_interval;
    for pair in &config.monitored_pairs {
        if !universe.instruments.contains(pair) {
            universe.instruments.push(pair.clone());
        }
    }
    let provider = Arc::new(SimulatedProvider::new(
        universe,
        events_tx,
        shutdown_token.clone(),
    ));

    let health_port = config.health_port;
    let bridge = Bridge::new(config, provider, bus);

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        bridge.session(),
        bridge.pending(),
    ));
    let health_server = HealthServer::new(health_port, health_state, shutdown_token.clone());
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let handle = tokio::select! {
        result = bridge.start(events_rx, shutdown_token.clone()) => match result {
            Ok(handle) => handle,
            Err(e) => {
                shutdown_token.cancel();
                let _ = health_task.await;
                return Err(e).context("bridge failed to start");
            }
        },
        () = shutdown_signal() => {
            shutdown_token.cancel();
            let _ = health_task.await;
            tracing::info!("Tick bridge stopped before startup completed");
            return Ok(());
        }
    };

    tracing::info!("Tick bridge ready");

    tokio::select! {
        () = shutdown_signal() => {}
        () = handle.stopped() => tracing::warn!("Bridge stopped unexpectedly"),
    }
    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        handle.shutdown().await;
        let _ = health_task.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timed out");
    }

    tracing::info!("Tick bridge stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &BridgeConfig) {
    tracing::info!(
        host_url = %config.provider.host_url,
        mode = config.provider.mode.as_str(),
        bus = config.bus.backend.as_str(),
        redis_host = %config.bus.redis_host,
        redis_port = config.bus.redis_port,
        health_port = config.health_port,
        pairs = ?config.monitored_pairs,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
