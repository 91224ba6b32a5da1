//! # Ephemeri Relay
//!
//! Entry point for the relay server.
//!
//! ## Startup Sequence
//!
//! 1. Install logging (`RELAY_LOG_LEVEL`, `RELAY_JSON_LOGS`)
//! 2. Load configuration (`RELAY_CONFIG_FILE`, then `API_KEY`, `PORT`, ...)
//! 3. Validate it; a missing `API_KEY` is fatal
//! 4. Serve HTTP and WebSocket on one port until Ctrl+C or SIGTERM

use anyhow::{Context, Result};
use tracing::info;

use ephemeri_gateway::{RelayConfig, RelayService};
use ephemeri_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("Failed to initialize telemetry")?;

    let config = RelayConfig::from_env().context("Failed to load relay configuration")?;
    info!(
        addr = %config.http_addr(),
        scheme = %config.auth.signature_scheme,
        "Starting Ephemeri relay v{}",
        ephemeri_gateway::VERSION
    );

    let service = RelayService::new(config)?;

    info!("Relay is running. Press Ctrl+C to stop.");
    service.start(shutdown_signal()).await?;

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
