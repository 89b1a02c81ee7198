use serde::Serialize;

use crate::channels::{normalize_number, Channel, ChatPayload, EmailPayload, WebhookPayload};

use super::dedupe::{dedupe_key, target_key};

/// Channel-specific payload carried by a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChannelPayload {
    Email(EmailPayload),
    Chat(ChatPayload),
    Webhook(WebhookPayload),
}

/// One delivery of one event on one channel (and, for webhooks, to one subscriber)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub channel: Channel,
    pub dedupe_key: String,
    pub event_id: String,
    pub payload: ChannelPayload,
}

impl NotificationJob {
    pub fn email(payload: EmailPayload) -> Self {
        let key = dedupe_key(
            Channel::Email,
            &payload.event_id,
            &target_key(&payload.recipients),
        );
        Self {
            channel: Channel::Email,
            dedupe_key: key,
            event_id: payload.event_id.clone(),
            payload: ChannelPayload::Email(payload),
        }
    }

    /// Numbers are keyed in their normalized form, so `+55...` and
    /// `whatsapp:+55...` are the same target
    pub fn chat(payload: ChatPayload) -> Self {
        let key = dedupe_key(
            Channel::Chat,
            &payload.event_id,
            &target_key(payload.numbers.iter().map(|n| normalize_number(n))),
        );
        Self {
            channel: Channel::Chat,
            dedupe_key: key,
            event_id: payload.event_id.clone(),
            payload: ChannelPayload::Chat(payload),
        }
    }

    pub fn webhook(payload: WebhookPayload) -> Self {
        let key = dedupe_key(
            Channel::Webhook,
            &payload.envelope.id,
            &payload.subscription.id.to_string(),
        );
        Self {
            channel: Channel::Webhook,
            dedupe_key: key,
            event_id: payload.envelope.id.clone(),
            payload: ChannelPayload::Webhook(payload),
        }
    }

    pub fn event_type(&self) -> &str {
        match &self.payload {
            ChannelPayload::Email(p) => &p.event_type,
            ChannelPayload::Chat(p) => &p.event_type,
            ChannelPayload::Webhook(p) => &p.envelope.event,
        }
    }
}
