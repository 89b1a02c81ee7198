//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::channels::Channel;

use super::{
    DEAD_LETTER_SIZE, NOTIFICATIONS_DEAD_LETTERED_TOTAL, NOTIFICATIONS_DELIVERED_TOTAL,
    NOTIFICATIONS_DUPLICATE_TOTAL, NOTIFICATIONS_FAILED_TOTAL, NOTIFICATIONS_RETRIES_TOTAL,
    NOTIFICATION_SEND_DURATION, QUEUE_PENDING_JOBS,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording per-channel Prometheus metrics
pub struct ChannelMetrics;

impl ChannelMetrics {
    pub fn record_delivered(channel: Channel, elapsed: Duration) {
        NOTIFICATIONS_DELIVERED_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc();
        NOTIFICATION_SEND_DURATION
            .with_label_values(&[channel.as_str(), "success"])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_failed(channel: Channel, elapsed: Duration) {
        NOTIFICATIONS_FAILED_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc();
        NOTIFICATION_SEND_DURATION
            .with_label_values(&[channel.as_str(), "failure"])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_duplicate(channel: Channel) {
        NOTIFICATIONS_DUPLICATE_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc();
    }

    pub fn record_dead_lettered(channel: Channel) {
        NOTIFICATIONS_DEAD_LETTERED_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc();
    }

    /// `kind` is "automatic" or "manual"
    pub fn record_retry(channel: Channel, kind: &str) {
        NOTIFICATIONS_RETRIES_TOTAL
            .with_label_values(&[channel.as_str(), kind])
            .inc();
    }
}

/// Helper struct for queue gauges (call before encoding)
pub struct QueueMetrics;

impl QueueMetrics {
    pub fn update(pending_jobs: usize, dead_letters: usize) {
        QUEUE_PENDING_JOBS.set(pending_jobs as i64);
        DEAD_LETTER_SIZE.set(dead_letters as i64);
    }
}
