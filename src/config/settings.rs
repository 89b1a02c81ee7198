use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
}

/// Channel defaults used when an event does not carry its own targets
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Sender address stamped on outgoing email
    #[serde(default = "default_email_from")]
    pub email_from: String,
    /// Broadcast recipients for staff-facing email
    #[serde(default)]
    pub email_recipients: Vec<String>,
    /// Broadcast numbers for chat messages
    #[serde(default)]
    pub chat_numbers: Vec<String>,
    /// Maximum records kept in each channel's dispatch history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum jobs executing at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts before a job is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay before a failed job is re-queued
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Per-request timeout in milliseconds
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
    /// Signing secret for subscriptions without their own
    #[serde(default)]
    pub secret: Option<String>,
    /// Subscriptions registered at startup (config files only)
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    /// Event type, or "*" for every event
    pub event_type: String,
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
    /// Emit log lines as JSON instead of human-readable text
    #[serde(default)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    /// Seconds to wait for in-flight deliveries before exiting
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
}

fn default_email_from() -> String {
    "no-reply@casebook.local".to_string()
}

fn default_history_limit() -> usize {
    500
}

fn default_concurrency() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1_000
}

fn default_webhook_timeout_ms() -> u64 {
    5_000
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "casebook-notifications".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_drain_timeout() -> u64 {
    15
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let queue = QueueConfig::for_run_mode(&run_mode);

        let builder = Config::builder()
            .set_default("queue.concurrency", queue.concurrency as i64)?
            .set_default("queue.max_attempts", queue.max_attempts as i64)?
            .set_default("queue.backoff_ms", queue.backoff_ms as i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // CASEBOOK_QUEUE__BACKOFF_MS, CASEBOOK_NOTIFICATIONS__EMAIL_RECIPIENTS=a@x,b@y, ...
            .add_source(
                Environment::with_prefix("CASEBOOK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("notifications.email_recipients")
                    .with_list_parse_key("notifications.chat_numbers"),
            );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.normalize();
        Ok(settings)
    }

    fn normalize(&mut self) {
        if self.webhook.secret.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.webhook.secret = None;
        }
        self.notifications.email_recipients.retain(|r| !r.trim().is_empty());
        self.notifications.chat_numbers.retain(|n| !n.trim().is_empty());
    }
}

impl QueueConfig {
    /// Queue defaults for a run mode; tests get short backoff and few attempts
    pub fn for_run_mode(run_mode: &str) -> Self {
        match run_mode {
            "test" => Self {
                concurrency: 2,
                max_attempts: 2,
                backoff_ms: 10,
            },
            _ => Self::default(),
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ShutdownSettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            email_from: default_email_from(),
            email_recipients: vec![],
            chat_numbers: vec![],
            history_limit: default_history_limit(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_webhook_timeout_ms(),
            secret: None,
            subscriptions: vec![],
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
            json_logs: false,
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout_seconds: default_drain_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let queue = QueueConfig::default();
        assert_eq!(queue.concurrency, 5);
        assert_eq!(queue.max_attempts, 3);
        assert_eq!(queue.backoff(), Duration::from_secs(1));

        let webhook = WebhookConfig::default();
        assert_eq!(webhook.timeout(), Duration::from_secs(5));
        assert!(webhook.secret.is_none());
    }

    #[test]
    fn test_run_mode_tightens_queue() {
        let queue = QueueConfig::for_run_mode("test");
        assert_eq!(queue.max_attempts, 2);
        assert_eq!(queue.backoff_ms, 10);

        let queue = QueueConfig::for_run_mode("production");
        assert_eq!(queue.max_attempts, 3);
    }

    #[test]
    fn test_normalize_drops_blank_entries() {
        let mut settings = Settings::default();
        settings.webhook.secret = Some("  ".to_string());
        settings.notifications.email_recipients =
            vec!["ops@ngo.org".to_string(), " ".to_string()];

        settings.normalize();

        assert!(settings.webhook.secret.is_none());
        assert_eq!(settings.notifications.email_recipients, vec!["ops@ngo.org"]);
    }
}
