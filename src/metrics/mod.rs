//! Delivery metrics for the notification engine.
//!
//! Two views of the same counters are kept:
//! - [`MetricsCollector`]: per-instance atomic counters, the source of truth
//!   for [`MetricsSnapshot`] and for tests (a fresh orchestrator starts at zero)
//! - Prometheus statics below, process-wide, exported via [`encode_metrics`]

mod helpers;

pub use helpers::{encode_metrics, ChannelMetrics, QueueMetrics};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use serde::Serialize;

use crate::channels::Channel;

/// Prefix for all metrics
const METRIC_PREFIX: &str = "casebook";

lazy_static! {
    /// Successful deliveries by channel
    pub static ref NOTIFICATIONS_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_delivered_total", METRIC_PREFIX),
        "Total notifications delivered",
        &["channel"]
    ).unwrap();

    /// Failed delivery attempts by channel
    pub static ref NOTIFICATIONS_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_failed_total", METRIC_PREFIX),
        "Total failed delivery attempts",
        &["channel"]
    ).unwrap();

    /// Jobs skipped because their dedupe key was already delivered
    pub static ref NOTIFICATIONS_DUPLICATE_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_duplicate_total", METRIC_PREFIX),
        "Total duplicate notifications skipped",
        &["channel"]
    ).unwrap();

    /// Jobs moved to the dead-letter list
    pub static ref NOTIFICATIONS_DEAD_LETTERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_dead_lettered_total", METRIC_PREFIX),
        "Total notifications dead-lettered after exhausting retries",
        &["channel"]
    ).unwrap();

    /// Retries, automatic and manual
    pub static ref NOTIFICATIONS_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_retries_total", METRIC_PREFIX),
        "Total notification retries",
        &["channel", "kind"]
    ).unwrap();

    /// Time spent inside channel adapters
    pub static ref NOTIFICATION_SEND_DURATION: HistogramVec = register_histogram_vec!(
        format!("{}_notification_send_duration_seconds", METRIC_PREFIX),
        "Channel send duration in seconds",
        &["channel", "outcome"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Jobs queued, running or backing off
    pub static ref QUEUE_PENDING_JOBS: IntGauge = register_int_gauge!(
        format!("{}_queue_pending_jobs", METRIC_PREFIX),
        "Jobs queued, running or waiting for retry"
    ).unwrap();

    /// Entries currently in the dead-letter list
    pub static ref DEAD_LETTER_SIZE: IntGauge = register_int_gauge!(
        format!("{}_dead_letter_size", METRIC_PREFIX),
        "Entries currently parked in the dead-letter list"
    ).unwrap();
}

/// Monotonic counters for one channel
#[derive(Debug, Default)]
struct ChannelCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    duplicates: AtomicU64,
    dead_lettered: AtomicU64,
    retries: AtomicU64,
    total_processing_time_us: AtomicU64,
}

impl ChannelCounters {
    fn snapshot(&self) -> ChannelMetricsSnapshot {
        let delivered = self.delivered.load(Ordering::Relaxed);
        let total_processing_time_ms =
            self.total_processing_time_us.load(Ordering::Relaxed) as f64 / 1_000.0;
        let average_processing_time_ms = if delivered == 0 {
            0.0
        } else {
            total_processing_time_ms / delivered as f64
        };

        ChannelMetricsSnapshot {
            delivered,
            failed: self.failed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            total_processing_time_ms,
            average_processing_time_ms,
        }
    }

    fn reset(&self) {
        self.delivered.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.duplicates.store(0, Ordering::Relaxed);
        self.dead_lettered.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.total_processing_time_us.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of one channel's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetricsSnapshot {
    pub delivered: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub dead_lettered: u64,
    pub retries: u64,
    pub total_processing_time_ms: f64,
    /// Mean send time of successful deliveries
    pub average_processing_time_ms: f64,
}

/// Snapshot of every channel, keyed by channel name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub channels: BTreeMap<Channel, ChannelMetricsSnapshot>,
}

impl MetricsSnapshot {
    pub fn channel(&self, channel: Channel) -> ChannelMetricsSnapshot {
        self.channels.get(&channel).cloned().unwrap_or_default()
    }
}

/// Per-channel delivery counters.
///
/// Every update is a single atomic operation, so concurrent workers never
/// lose increments.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    email: ChannelCounters,
    chat: ChannelCounters,
    webhook: ChannelCounters,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, channel: Channel) -> &ChannelCounters {
        match channel {
            Channel::Email => &self.email,
            Channel::Chat => &self.chat,
            Channel::Webhook => &self.webhook,
        }
    }

    pub fn record_delivered(&self, channel: Channel, elapsed: Duration) {
        let counters = self.counters(channel);
        counters.delivered.fetch_add(1, Ordering::Relaxed);
        counters
            .total_processing_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        ChannelMetrics::record_delivered(channel, elapsed);
    }

    pub fn record_failed(&self, channel: Channel, elapsed: Duration) {
        self.counters(channel).failed.fetch_add(1, Ordering::Relaxed);
        ChannelMetrics::record_failed(channel, elapsed);
    }

    pub fn record_duplicate(&self, channel: Channel) {
        self.counters(channel).duplicates.fetch_add(1, Ordering::Relaxed);
        ChannelMetrics::record_duplicate(channel);
    }

    pub fn record_dead_lettered(&self, channel: Channel) {
        self.counters(channel)
            .dead_lettered
            .fetch_add(1, Ordering::Relaxed);
        ChannelMetrics::record_dead_lettered(channel);
    }

    pub fn record_retry(&self, channel: Channel) {
        self.counters(channel).retries.fetch_add(1, Ordering::Relaxed);
        ChannelMetrics::record_retry(channel, "automatic");
    }

    /// An operator re-enqueued a dead letter
    pub fn record_manual_retry(&self, channel: Channel) {
        self.counters(channel).retries.fetch_add(1, Ordering::Relaxed);
        ChannelMetrics::record_retry(channel, "manual");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            channels: Channel::ALL
                .iter()
                .map(|channel| (*channel, self.counters(*channel).snapshot()))
                .collect(),
        }
    }

    /// Zero every counter (ops and test use only; Prometheus counters stay monotonic)
    pub fn reset(&self) {
        for channel in Channel::ALL {
            self.counters(channel).reset();
        }
    }
}
