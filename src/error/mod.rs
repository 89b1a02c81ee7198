use thiserror::Error;

use crate::queue::JobPanic;
use crate::telemetry::TelemetryError;

/// Failure of a single delivery attempt on a channel.
///
/// Every variant is treated as transient by the job queue: the attempt is
/// retried until the attempt budget runs out and the job is dead-lettered.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Chat send to {number} failed: {reason}")]
    ChatSend { number: String, reason: String },

    #[error("Webhook responded with status {status}")]
    WebhookStatus { status: u16 },

    #[error("Webhook request timed out after {timeout_ms}ms")]
    WebhookTimeout { timeout_ms: u64 },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error arm of `Hmac::new_from_slice`. HMAC-SHA256 takes keys of any
    /// length, so signing never produces it.
    #[error("Invalid signing key")]
    InvalidSigningKey,

    #[error("Delivery panicked: {0}")]
    Panicked(String),
}

impl ChannelError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

impl From<JobPanic> for ChannelError {
    fn from(panic: JobPanic) -> Self {
        Self::Panicked(panic.0)
    }
}

/// Errors raised while managing webhook subscriptions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Event type must not be empty")]
    EmptyEventType,

    #[error("Invalid webhook URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Startup and wiring errors surfaced by the binary
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Webhook subscription error: {0}")]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ChannelError::WebhookStatus { status: 503 };
        assert_eq!(err.to_string(), "Webhook responded with status 503");

        let err = ChannelError::ChatSend {
            number: "whatsapp:+5511999990000".to_string(),
            reason: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("whatsapp:+5511999990000"));

        let err = RegistryError::InvalidUrl {
            url: "nope".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert!(err.to_string().starts_with("Invalid webhook URL nope"));
    }
}
