use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use casebook_notifications::config::Settings;
use casebook_notifications::metrics::encode_metrics;
use casebook_notifications::notification::{NotificationEvent, NotificationOrchestrator};
use casebook_notifications::shutdown::{GracefulShutdown, ShutdownConfig};
use casebook_notifications::telemetry::init_telemetry;

/// Reads newline-delimited JSON events from stdin and publishes them until
/// stdin closes or the process is signalled.
#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize tracing (keep the guard alive until exit)
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(
        concurrency = settings.queue.concurrency,
        max_attempts = settings.queue.max_attempts,
        backoff_ms = settings.queue.backoff_ms,
        "Configuration loaded"
    );

    let orchestrator = Arc::new(NotificationOrchestrator::from_settings(&settings)?);
    tracing::info!(
        subscriptions = orchestrator.subscriptions().len(),
        "Notification engine ready, reading events from stdin"
    );

    let relay = relay_stdin(orchestrator.clone());

    let reason = tokio::select! {
        result = relay => {
            result?;
            "stdin closed"
        }
        result = shutdown_signal() => {
            result?;
            "signal received"
        }
    };

    let shutdown = GracefulShutdown::with_config(
        orchestrator.clone(),
        ShutdownConfig::from(&settings.shutdown),
    );
    let result = shutdown.execute(reason).await;

    let snapshot = orchestrator.metrics_snapshot();
    tracing::info!(
        metrics = %serde_json::to_string(&snapshot)?,
        drained = result.drained,
        "Final delivery metrics"
    );
    tracing::debug!(prometheus = %encode_metrics()?, "Prometheus exposition");

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn relay_stdin(orchestrator: Arc<NotificationOrchestrator>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<NotificationEvent>(&line) {
            Ok(event) => {
                orchestrator.publish(event);
            }
            Err(e) => {
                tracing::warn!(line = line_number, error = %e, "Skipping malformed event");
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => {
                result?;
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::info!("Received terminate signal, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }

    Ok(())
}
