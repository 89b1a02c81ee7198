//! Graceful shutdown for the notification engine.
//!
//! On shutdown the process stops publishing and gives in-flight deliveries
//! (including jobs sleeping out a retry backoff) a bounded window to finish.
//! Whatever is still pending when the window closes is lost, as is every
//! in-memory queue on exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::config::ShutdownSettings;
use crate::notification::NotificationOrchestrator;

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for the queue to go idle (default: 15 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self::from(&ShutdownSettings::default())
    }
}

impl From<&ShutdownSettings> for ShutdownConfig {
    fn from(settings: &ShutdownSettings) -> Self {
        Self {
            drain_timeout: settings.drain_timeout(),
        }
    }
}

pub struct GracefulShutdown {
    orchestrator: Arc<NotificationOrchestrator>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(orchestrator: Arc<NotificationOrchestrator>) -> Self {
        Self::with_config(orchestrator, ShutdownConfig::default())
    }

    pub fn with_config(orchestrator: Arc<NotificationOrchestrator>, config: ShutdownConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Wait for the queue to drain, up to the configured timeout
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(pending_jobs = self.orchestrator.queue_stats().pending)
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = Instant::now();
        tracing::info!(reason = %reason, "Starting graceful shutdown, draining notification queue");

        let drained = timeout(
            self.config.drain_timeout,
            self.orchestrator.wait_for_queue_idle(),
        )
        .await
        .is_ok();

        let remaining_jobs = self.orchestrator.queue_stats().pending;
        let dead_letters = self.orchestrator.dead_letters().len();

        if drained {
            tracing::info!("Notification queue drained");
        } else {
            tracing::warn!(
                remaining_jobs = remaining_jobs,
                drain_timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "Drain timeout reached, pending notifications will be lost"
            );
        }
        if dead_letters > 0 {
            tracing::warn!(
                dead_letters = dead_letters,
                "Exiting with unrecovered dead letters"
            );
        }

        let result = ShutdownResult {
            drained,
            remaining_jobs,
            dead_letters,
            duration: start.elapsed(),
        };

        tracing::info!(
            drained = result.drained,
            remaining_jobs = result.remaining_jobs,
            dead_letters = result.dead_letters,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }
}

/// Outcome of a graceful shutdown
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether the queue went idle before the timeout
    pub drained: bool,
    /// Jobs still queued, running or backing off at exit
    pub remaining_jobs: usize,
    /// Dead letters that were never retried
    pub dead_letters: usize,
    pub duration: Duration,
}
