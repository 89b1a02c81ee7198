//! Shared fixtures for integration tests: scripted transports and settings.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use casebook_notifications::channels::{ChatTransport, EmailTransport, OutgoingEmail};
use casebook_notifications::config::Settings;
use casebook_notifications::error::ChannelError;
use casebook_notifications::notification::{NotificationOrchestrator, Transports};

/// Email transport that records every message and fails while `failures_left > 0`
#[derive(Default)]
pub struct ScriptedEmail {
    pub failures_left: AtomicUsize,
    pub calls: AtomicUsize,
    pub sent: Mutex<Vec<OutgoingEmail>>,
    /// Simulated provider latency per send
    pub latency: Option<Duration>,
}

impl ScriptedEmail {
    pub fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        })
    }

    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EmailTransport for ScriptedEmail {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), ChannelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if take_failure(&self.failures_left) {
            return Err(ChannelError::transport("smtp relay unavailable"));
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

/// Chat transport that records `(to, body)` pairs
#[derive(Default)]
pub struct ScriptedChat {
    pub failures_left: AtomicUsize,
    pub calls: AtomicUsize,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedChat {
    pub fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedChat {
    async fn send_message(&self, to: &str, body: &str) -> Result<String, ChannelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures_left) {
            return Err(ChannelError::transport("provider rate limited"));
        }
        let mut sent = self.sent.lock();
        sent.push((to.to_string(), body.to_string()));
        Ok(format!("SM{:04}", sent.len()))
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Three attempts, 5ms backoff, broadcast lists filled in
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.notifications.email_from = "no-reply@ngo.org".to_string();
    settings.notifications.email_recipients =
        vec!["coordenacao@ngo.org".to_string(), "social@ngo.org".to_string()];
    settings.notifications.chat_numbers = vec!["+5511911112222".to_string()];
    settings.queue.concurrency = 4;
    settings.queue.max_attempts = 3;
    settings.queue.backoff_ms = 5;
    settings.webhook.timeout_ms = 1_000;
    settings
}

pub fn orchestrator_with(
    settings: &Settings,
    email: Arc<ScriptedEmail>,
    chat: Arc<ScriptedChat>,
) -> NotificationOrchestrator {
    NotificationOrchestrator::new(
        settings,
        Transports {
            email,
            chat,
            http: reqwest::Client::new(),
        },
    )
}
