use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ChannelError;
use crate::metrics::MetricsCollector;

use super::{measured, Channel, DispatchHistory};

/// Address scheme of the chat provider
pub const CHAT_ADDRESS_PREFIX: &str = "whatsapp:";

/// Provider-agnostic chat job payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub numbers: Vec<String>,
    pub message: String,
    pub event_type: String,
    pub event_id: String,
}

/// One per-number send inside a chat dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDelivery {
    pub to: String,
    pub provider_message_id: String,
}

/// Record of a delivered chat batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDispatchRecord {
    pub numbers: Vec<String>,
    pub message: String,
    pub event_type: String,
    pub event_id: String,
    pub deliveries: Vec<ChatDelivery>,
    pub dispatched_at: DateTime<Utc>,
}

/// Outbound chat provider; returns the provider-assigned message id
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> Result<String, ChannelError>;
}

/// Transport that only logs; used when no provider is configured
#[derive(Debug, Default)]
pub struct LogChatTransport;

#[async_trait]
impl ChatTransport for LogChatTransport {
    async fn send_message(&self, to: &str, body: &str) -> Result<String, ChannelError> {
        let id = format!("log-{}", Uuid::new_v4());
        tracing::info!(
            to = %to,
            provider_message_id = %id,
            length = body.chars().count(),
            "Chat message dispatched (log transport)"
        );
        Ok(id)
    }
}

/// Convert a phone number into the provider address scheme.
///
/// Whitespace is stripped; numbers already carrying the prefix are kept.
pub fn normalize_number(number: &str) -> String {
    let compact: String = number.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with(CHAT_ADDRESS_PREFIX) {
        compact
    } else {
        format!("{}{}", CHAT_ADDRESS_PREFIX, compact)
    }
}

pub struct ChatAdapter {
    transport: Arc<dyn ChatTransport>,
    history: DispatchHistory<ChatDispatchRecord>,
    metrics: Arc<MetricsCollector>,
}

impl ChatAdapter {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        history_limit: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            transport,
            history: DispatchHistory::new(history_limit),
            metrics,
        }
    }

    /// Send the message to every number in order.
    ///
    /// The first failing number fails the whole batch. Messages already sent
    /// to earlier numbers are not recalled.
    #[tracing::instrument(
        name = "chat.send",
        skip(self, payload),
        fields(event_id = %payload.event_id, event_type = %payload.event_type, numbers = payload.numbers.len())
    )]
    pub async fn send(&self, payload: &ChatPayload) -> Result<(), ChannelError> {
        measured(Channel::Chat, &self.metrics, async {
            let mut deliveries = Vec::with_capacity(payload.numbers.len());

            for number in &payload.numbers {
                let to = normalize_number(number);
                let provider_message_id = self
                    .transport
                    .send_message(&to, &payload.message)
                    .await
                    .map_err(|e| ChannelError::ChatSend {
                        number: to.clone(),
                        reason: e.to_string(),
                    })?;
                deliveries.push(ChatDelivery {
                    to,
                    provider_message_id,
                });
            }

            self.history.push(ChatDispatchRecord {
                numbers: deliveries.iter().map(|d| d.to.clone()).collect(),
                message: payload.message.clone(),
                event_type: payload.event_type.clone(),
                event_id: payload.event_id.clone(),
                deliveries,
                dispatched_at: Utc::now(),
            });

            tracing::debug!(event_id = %payload.event_id, "Chat batch delivered");
            Ok(())
        })
        .await
    }

    pub fn history(&self) -> Vec<ChatDispatchRecord> {
        self.history.list()
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct ScriptedTransport {
        sent: Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send_message(&self, to: &str, _body: &str) -> Result<String, ChannelError> {
            if self.fail_for.as_deref() == Some(to) {
                return Err(ChannelError::transport("number unreachable"));
            }
            let mut sent = self.sent.lock();
            sent.push(to.to_string());
            Ok(format!("SM{}", sent.len()))
        }
    }

    fn payload(numbers: &[&str]) -> ChatPayload {
        ChatPayload {
            numbers: numbers.iter().map(|n| n.to_string()).collect(),
            message: "Olá".to_string(),
            event_type: "action_item.overdue".to_string(),
            event_id: "evt-9".to_string(),
        }
    }

    #[test]
    fn test_normalize_number() {
        assert_eq!(normalize_number("+5511999990000"), "whatsapp:+5511999990000");
        assert_eq!(normalize_number(" +55 11 99999 0000 "), "whatsapp:+5511999990000");
        assert_eq!(
            normalize_number("whatsapp:+5511999990000"),
            "whatsapp:+5511999990000"
        );
    }

    #[tokio::test]
    async fn test_one_message_per_number() {
        let transport = Arc::new(ScriptedTransport::default());
        let metrics = Arc::new(MetricsCollector::new());
        let adapter = ChatAdapter::new(transport.clone(), 10, metrics.clone());

        adapter
            .send(&payload(&["+5511111111111", "whatsapp:+5522222222222"]))
            .await
            .unwrap();

        assert_eq!(
            *transport.sent.lock(),
            vec!["whatsapp:+5511111111111", "whatsapp:+5522222222222"]
        );
        let history = adapter.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].deliveries.len(), 2);
        assert_eq!(history[0].deliveries[1].provider_message_id, "SM2");
        assert_eq!(metrics.snapshot().channel(Channel::Chat).delivered, 1);
    }

    #[tokio::test]
    async fn test_any_failure_fails_batch_without_revert() {
        let transport = Arc::new(ScriptedTransport {
            fail_for: Some("whatsapp:+5522222222222".to_string()),
            ..Default::default()
        });
        let metrics = Arc::new(MetricsCollector::new());
        let adapter = ChatAdapter::new(transport.clone(), 10, metrics.clone());

        let result = adapter
            .send(&payload(&["+5511111111111", "+5522222222222", "+5533333333333"]))
            .await;

        match result {
            Err(ChannelError::ChatSend { number, .. }) => {
                assert_eq!(number, "whatsapp:+5522222222222")
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // The first send stands, the third was never attempted
        assert_eq!(*transport.sent.lock(), vec!["whatsapp:+5511111111111"]);
        assert!(adapter.history().is_empty());
        assert_eq!(metrics.snapshot().channel(Channel::Chat).failed, 1);
    }
}
