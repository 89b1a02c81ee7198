use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ChannelError;
use crate::metrics::MetricsCollector;

use super::{measured, Channel, DispatchHistory};

/// Provider-agnostic email job payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailPayload {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub event_type: String,
    pub event_id: String,
}

/// Message handed to the email transport
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub message_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Record of a delivered email
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDispatchRecord {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub event_type: String,
    pub event_id: String,
    pub message_id: String,
    pub dispatched_at: DateTime<Utc>,
}

/// Outbound email provider (SMTP relay, HTTP API, ...)
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), ChannelError>;
}

/// Transport that only logs; used when no provider is configured
#[derive(Debug, Default)]
pub struct LogEmailTransport;

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), ChannelError> {
        tracing::info!(
            message_id = %email.message_id,
            from = %email.from,
            to = ?email.to,
            subject = %email.subject,
            "Email dispatched (log transport)"
        );
        Ok(())
    }
}

pub struct EmailAdapter {
    transport: Arc<dyn EmailTransport>,
    from: String,
    history: DispatchHistory<EmailDispatchRecord>,
    metrics: Arc<MetricsCollector>,
}

impl EmailAdapter {
    pub fn new(
        transport: Arc<dyn EmailTransport>,
        from: impl Into<String>,
        history_limit: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            transport,
            from: from.into(),
            history: DispatchHistory::new(history_limit),
            metrics,
        }
    }

    #[tracing::instrument(
        name = "email.send",
        skip(self, payload),
        fields(event_id = %payload.event_id, event_type = %payload.event_type, recipients = payload.recipients.len())
    )]
    pub async fn send(&self, payload: &EmailPayload) -> Result<(), ChannelError> {
        measured(Channel::Email, &self.metrics, async {
            let message_id = format!("<{}@casebook>", Uuid::new_v4());
            let email = OutgoingEmail {
                message_id: message_id.clone(),
                from: self.from.clone(),
                to: payload.recipients.clone(),
                subject: payload.subject.clone(),
                body: payload.body.clone(),
            };

            self.transport.send(&email).await?;

            self.history.push(EmailDispatchRecord {
                recipients: payload.recipients.clone(),
                subject: payload.subject.clone(),
                body: payload.body.clone(),
                event_type: payload.event_type.clone(),
                event_id: payload.event_id.clone(),
                message_id,
                dispatched_at: Utc::now(),
            });

            tracing::debug!(event_id = %payload.event_id, "Email delivered");
            Ok(())
        })
        .await
    }

    pub fn history(&self) -> Vec<EmailDispatchRecord> {
        self.history.list()
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }
}
