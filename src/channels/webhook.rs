use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashSet;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::error::ChannelError;
use crate::metrics::MetricsCollector;
use crate::webhooks::WebhookSubscription;

use super::signing::sign_payload;
use super::{measured, Channel, DispatchHistory};

pub const HEADER_EVENT: &str = "x-casebook-event";
pub const HEADER_WEBHOOK_ID: &str = "x-casebook-webhook-id";
pub const HEADER_DELIVERY: &str = "x-casebook-webhook-delivery";
pub const HEADER_TIMESTAMP: &str = "x-casebook-webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "x-casebook-webhook-signature";

/// JSON body POSTed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    pub id: String,
    pub event: String,
    pub triggered_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// One delivery of an event to one subscription
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub subscription: WebhookSubscription,
    pub envelope: WebhookEnvelope,
}

impl WebhookPayload {
    /// `subscriptionId:eventId`
    pub fn delivery_key(&self) -> String {
        format!("{}:{}", self.subscription.id, self.envelope.id)
    }
}

/// Record of a confirmed (2xx) webhook delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDispatchRecord {
    pub subscription_id: uuid::Uuid,
    pub url: String,
    pub event_type: String,
    pub event_id: String,
    pub delivery_key: String,
    pub status: u16,
    pub signed: bool,
    pub dispatched_at: DateTime<Utc>,
}

pub struct WebhookAdapter {
    client: reqwest::Client,
    timeout: Duration,
    default_secret: Option<String>,
    /// Delivery keys confirmed with a 2xx
    delivered: DashSet<String>,
    history: DispatchHistory<WebhookDispatchRecord>,
    metrics: Arc<MetricsCollector>,
}

impl WebhookAdapter {
    pub fn new(
        client: reqwest::Client,
        timeout: Duration,
        default_secret: Option<String>,
        history_limit: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            client,
            timeout,
            default_secret,
            delivered: DashSet::new(),
            history: DispatchHistory::new(history_limit),
            metrics,
        }
    }

    /// POST the envelope to the subscription URL.
    ///
    /// A delivery key that already got a 2xx is skipped silently. Timeouts,
    /// transport errors and non-2xx responses are returned as errors and the
    /// key stays undelivered.
    #[tracing::instrument(
        name = "webhook.send",
        skip(self, payload),
        fields(
            subscription_id = %payload.subscription.id,
            event_id = %payload.envelope.id,
            event_type = %payload.envelope.event
        )
    )]
    pub async fn send(&self, payload: &WebhookPayload) -> Result<(), ChannelError> {
        let delivery_key = payload.delivery_key();
        if self.delivered.contains(&delivery_key) {
            tracing::debug!(delivery_key = %delivery_key, "Webhook already delivered, skipping");
            return Ok(());
        }

        measured(Channel::Webhook, &self.metrics, async {
            let subscription = &payload.subscription;
            let body = serde_json::to_string(&payload.envelope)?;
            let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

            let mut request = self
                .client
                .post(&subscription.url)
                .header(CONTENT_TYPE, "application/json")
                .header(HEADER_EVENT, &payload.envelope.event)
                .header(HEADER_WEBHOOK_ID, subscription.id.to_string())
                .header(HEADER_DELIVERY, &delivery_key)
                .header(HEADER_TIMESTAMP, &timestamp);

            let secret = subscription
                .secret
                .as_deref()
                .or(self.default_secret.as_deref());
            if let Some(secret) = secret {
                request = request.header(HEADER_SIGNATURE, sign_payload(secret, &timestamp, &body)?);
            }

            // Dropping the request future on timeout aborts the connection
            let response = tokio::time::timeout(self.timeout, request.body(body).send())
                .await
                .map_err(|_| ChannelError::WebhookTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                })??;

            let status = response.status();
            if !status.is_success() {
                return Err(ChannelError::WebhookStatus {
                    status: status.as_u16(),
                });
            }

            self.delivered.insert(delivery_key.clone());
            self.history.push(WebhookDispatchRecord {
                subscription_id: subscription.id,
                url: subscription.url.clone(),
                event_type: payload.envelope.event.clone(),
                event_id: payload.envelope.id.clone(),
                delivery_key: delivery_key.clone(),
                status: status.as_u16(),
                signed: secret.is_some(),
                dispatched_at: Utc::now(),
            });

            tracing::debug!(
                delivery_key = %delivery_key,
                status = status.as_u16(),
                "Webhook delivered"
            );
            Ok(())
        })
        .await
    }

    pub fn is_delivered(&self, delivery_key: &str) -> bool {
        self.delivered.contains(delivery_key)
    }

    pub fn history(&self) -> Vec<WebhookDispatchRecord> {
        self.history.list()
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }
}
