//! Channel adapters: email, chat (WhatsApp-style) and outbound webhooks.
//!
//! Each adapter exposes a single `send` that wraps the transport call with
//! duration and outcome measurement reported to the [`MetricsCollector`]:
//! success counts as `delivered` with its elapsed time, failure counts as
//! `failed` and the error is returned so the job queue can retry.
//!
//! Adapters also keep a bounded, channel-local history of successful
//! dispatches for inspection.

mod chat;
mod email;
mod history;
pub mod signing;
mod webhook;

use std::fmt;
use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::metrics::MetricsCollector;

pub use chat::{
    normalize_number, ChatAdapter, ChatDelivery, ChatDispatchRecord, ChatPayload, ChatTransport,
    LogChatTransport, CHAT_ADDRESS_PREFIX,
};
pub use email::{
    EmailAdapter, EmailDispatchRecord, EmailPayload, EmailTransport, LogEmailTransport,
    OutgoingEmail,
};
pub use history::DispatchHistory;
pub use webhook::{
    WebhookAdapter, WebhookDispatchRecord, WebhookEnvelope, WebhookPayload, HEADER_DELIVERY,
    HEADER_EVENT, HEADER_SIGNATURE, HEADER_TIMESTAMP, HEADER_WEBHOOK_ID,
};

/// An independent delivery mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Chat,
    Webhook,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Chat, Channel::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Chat => "chat",
            Channel::Webhook => "webhook",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run a send and report its duration and outcome for `channel`
pub(crate) async fn measured<F>(
    channel: Channel,
    metrics: &MetricsCollector,
    send: F,
) -> Result<(), ChannelError>
where
    F: Future<Output = Result<(), ChannelError>>,
{
    let started = Instant::now();
    let result = send.await;
    let elapsed = started.elapsed();

    match &result {
        Ok(()) => metrics.record_delivered(channel, elapsed),
        Err(e) => {
            metrics.record_failed(channel, elapsed);
            tracing::warn!(
                channel = %channel,
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "Channel send failed"
            );
        }
    }

    result
}
