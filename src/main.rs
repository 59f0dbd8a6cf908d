//! Sensorium Binary Entry Point
//!
//! Loads sensor definitions, starts their pollers and serves `/metrics`.
//! Core functionality is provided by the `sensorium` library crate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sensorium::{
    config::{AppConfig, parse_duration, parse_sensors},
    poller::SensorRegistry,
    server::{AppState, create_router},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sensorium - declarative sensors for Prometheus
#[derive(Parser, Debug)]
#[command(name = "sensorium", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "SENSORIUM_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "SENSORIUM_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "SENSORIUM_SERVER_PORT")]
    server_port: Option<u16>,

    /// Shutdown grace period, e.g. `5s` (overrides config file)
    #[arg(long, env = "SENSORIUM_SHUTDOWN_TIMEOUT", value_parser = parse_duration)]
    shutdown_timeout: Option<Duration>,

    /// Validate the configuration and sensors, then exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sensorium=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Sensorium - declarative sensors for Prometheus");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load_with_sensor_path(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(timeout) = cli.shutdown_timeout {
        config.telemetry.shutdown_timeout = timeout;
    }
    config.validate()?;

    // Parse sensors before any poller starts
    let total = config.sensors.len();
    let sensors = parse_sensors(
        std::mem::take(&mut config.sensors),
        config.telemetry.skip_invalid,
    )?;
    tracing::info!("Parsed {} of {} sensors", sensors.len(), total);

    if cli.check_config {
        tracing::info!("Configuration OK");
        return Ok(());
    }

    // Register collectors and start pollers
    let registry = Arc::new(
        SensorRegistry::new(prometheus::Registry::new())
            .with_first_tick(config.telemetry.first_tick),
    );
    for sensor in &sensors {
        registry.spawn(sensor).await?;
    }

    let app = create_router(AppState {
        sensors: Arc::clone(&registry),
    });

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Metrics listening on: http://{}/metrics", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down pollers...");
    registry
        .shutdown_with_timeout(config.telemetry.shutdown_timeout)
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
