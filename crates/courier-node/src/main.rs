mod procedures;
mod telemetry;

use std::time::Duration;

use anyhow::{Context, Result};
use courier::{CourierConfig, System};
use telemetry::{init_telemetry, TelemetryConfig};

const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Local .env is optional
    let _ = dotenvy::dotenv();

    // Configure via environment variables:
    // - OTEL_SERVICE_NAME: Service name (default: "courier-node")
    // - OTEL_EXPORTER_OTLP_ENDPOINT: OTLP endpoint (requires the otlp feature)
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "courier=info")
    let _telemetry_guard = init_telemetry(TelemetryConfig::from_env());

    let config = CourierConfig::from_env();
    tracing::info!(
        node = %config.node_name,
        initial_workers = config.pool.initial_capacity,
        max_workers = config.pool.max_capacity,
        idle_timeout = ?config.pool.idle_timeout,
        routing = %config.routing,
        "courier-node starting..."
    );

    let system = System::start(config).context("Failed to start courier system")?;
    procedures::register_builtins(&system)
        .await
        .context("Failed to register built-in procedures")?;

    let mut ticker = tokio::time::interval(STATS_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => match system.pool().stats().await {
                Ok(stats) => tracing::info!(
                    total = stats.total,
                    idle = stats.idle,
                    busy = stats.busy,
                    waiting = stats.waiting,
                    "Worker pool stats"
                ),
                Err(e) => tracing::warn!(error = %e, "Failed to query pool stats"),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                break;
            }
        }
    }

    system
        .shutdown()
        .await
        .context("Courier system did not shut down cleanly")?;

    tracing::info!("courier-node shutdown complete");
    Ok(())
}
