use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use uuid::Uuid;

use crate::channels::{
    ChatAdapter, ChatDispatchRecord, ChatPayload, ChatTransport, EmailAdapter,
    EmailDispatchRecord, EmailPayload, EmailTransport, LogChatTransport, LogEmailTransport,
    WebhookAdapter, WebhookDispatchRecord, WebhookEnvelope, WebhookPayload,
};
use crate::config::{NotificationConfig, Settings};
use crate::error::ChannelError;
use crate::metrics::{MetricsCollector, MetricsSnapshot, QueueMetrics};
use crate::queue::{Job, JobHandler, JobQueue, JobQueueConfig, QueueStats};
use crate::webhooks::SubscriptionRegistry;

use super::dead_letter::{DeadLetterEntry, DeadLetterStore};
use super::job::{ChannelPayload, NotificationJob};
use super::messages::{chat_message, email_message, email_recipients};
use super::types::{NotificationEvent, PublishedEvent};

/// Outbound providers used by the channel adapters
#[derive(Clone)]
pub struct Transports {
    pub email: Arc<dyn EmailTransport>,
    pub chat: Arc<dyn ChatTransport>,
    /// Client for webhook POSTs; per-request timeouts come from settings
    pub http: reqwest::Client,
}

impl Default for Transports {
    /// Logging email/chat transports and a default HTTP client
    fn default() -> Self {
        Self {
            email: Arc::new(LogEmailTransport),
            chat: Arc::new(LogChatTransport),
            http: reqwest::Client::new(),
        }
    }
}

/// Queue handler: dedupe check, adapter call, failure bookkeeping
struct DeliveryWorker {
    email: EmailAdapter,
    chat: ChatAdapter,
    webhook: WebhookAdapter,
    /// Dedupe keys that reached terminal success
    processed: DashSet<String>,
    /// Dedupe keys claimed by a running attempt
    in_flight: DashSet<String>,
    dead_letters: DeadLetterStore,
    metrics: Arc<MetricsCollector>,
}

/// Exclusive hold on a dedupe key for one attempt; released on drop, even
/// when the send panics
struct InFlightClaim<'a> {
    keys: &'a DashSet<String>,
    key: &'a str,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(keys: &'a DashSet<String>, key: &'a str) -> Option<Self> {
        keys.insert(key.to_string()).then(|| Self { keys, key })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.keys.remove(self.key);
    }
}

#[async_trait]
impl JobHandler<NotificationJob> for DeliveryWorker {
    type Error = ChannelError;

    async fn handle(&self, job: &Job<NotificationJob>) -> Result<(), ChannelError> {
        let notification = &job.payload;

        // Claimed before the first await so a concurrent job with the same
        // key sees it
        let claim = InFlightClaim::acquire(&self.in_flight, &notification.dedupe_key);
        if self.processed.contains(&notification.dedupe_key) || claim.is_none() {
            self.metrics.record_duplicate(notification.channel);
            tracing::debug!(
                channel = %notification.channel,
                dedupe_key = %notification.dedupe_key,
                "Duplicate notification skipped"
            );
            return Ok(());
        }

        let result = match &notification.payload {
            ChannelPayload::Email(payload) => self.email.send(payload).await,
            ChannelPayload::Chat(payload) => self.chat.send(payload).await,
            ChannelPayload::Webhook(payload) => self.webhook.send(payload).await,
        };

        if result.is_ok() {
            self.processed.insert(notification.dedupe_key.clone());
        }
        drop(claim);
        result
    }

    fn on_retry(&self, job: &Job<NotificationJob>, error: &ChannelError) {
        self.metrics.record_retry(job.payload.channel);
        tracing::warn!(
            job_id = %job.id,
            channel = %job.payload.channel,
            event_id = %job.payload.event_id,
            attempts = job.attempts,
            error = %error,
            "Notification delivery failed, will retry"
        );
    }

    fn on_error(&self, job: Job<NotificationJob>, error: ChannelError) {
        let channel = job.payload.channel;
        let event_id = job.payload.event_id.clone();
        let attempts = job.attempts;

        let entry_id = self
            .dead_letters
            .push(job.payload, error.to_string(), attempts);
        self.metrics.record_dead_lettered(channel);

        tracing::error!(
            dead_letter_id = %entry_id,
            channel = %channel,
            event_id = %event_id,
            attempts = attempts,
            error = %error,
            "Notification dead-lettered"
        );
    }
}

/// Entry point of the notification engine.
///
/// Turns domain events into per-channel delivery jobs and exposes the
/// inspection and recovery operations. All state (queue, dedupe set, dead
/// letters, histories, metrics, webhook subscriptions) belongs to the
/// instance; nothing survives a restart.
pub struct NotificationOrchestrator {
    config: NotificationConfig,
    subscriptions: SubscriptionRegistry,
    metrics: Arc<MetricsCollector>,
    queue: JobQueue<NotificationJob, DeliveryWorker>,
}

impl NotificationOrchestrator {
    pub fn new(settings: &Settings, transports: Transports) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let history_limit = settings.notifications.history_limit;

        let worker = DeliveryWorker {
            email: EmailAdapter::new(
                transports.email,
                settings.notifications.email_from.clone(),
                history_limit,
                metrics.clone(),
            ),
            chat: ChatAdapter::new(transports.chat, history_limit, metrics.clone()),
            webhook: WebhookAdapter::new(
                transports.http,
                settings.webhook.timeout(),
                settings.webhook.secret.clone(),
                history_limit,
                metrics.clone(),
            ),
            processed: DashSet::new(),
            in_flight: DashSet::new(),
            dead_letters: DeadLetterStore::new(),
            metrics: metrics.clone(),
        };

        let queue_config = JobQueueConfig::from(&settings.queue);
        tracing::info!(
            concurrency = queue_config.concurrency,
            max_attempts = queue_config.max_attempts,
            backoff_ms = queue_config.backoff.as_millis() as u64,
            email_recipients = settings.notifications.email_recipients.len(),
            chat_numbers = settings.notifications.chat_numbers.len(),
            "Notification orchestrator initialized"
        );

        Self {
            config: settings.notifications.clone(),
            subscriptions: SubscriptionRegistry::new(),
            metrics,
            queue: JobQueue::new(queue_config, worker),
        }
    }

    /// Production wiring: logging email/chat transports, an HTTP client with
    /// the service user agent, and the subscriptions listed in config.
    pub fn from_settings(settings: &Settings) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("casebook-notifications/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let orchestrator = Self::new(
            settings,
            Transports {
                http,
                ..Transports::default()
            },
        );

        for subscription in &settings.webhook.subscriptions {
            orchestrator.subscriptions.register(
                subscription.event_type.clone(),
                subscription.url.clone(),
                subscription.secret.clone(),
            )?;
        }

        Ok(orchestrator)
    }

    /// Fan an event out to every eligible channel.
    ///
    /// Returns as soon as the jobs are enqueued; delivery outcomes show up in
    /// histories, metrics and dead letters. Callable from any thread; jobs
    /// run on the runtime the orchestrator was built in.
    pub fn publish(&self, event: impl Into<NotificationEvent>) -> PublishedEvent {
        let event = event.into().normalize();
        let event_type = event.event_type();
        let mut jobs = Vec::new();

        if let Some(message) = email_message(&event) {
            let recipients = email_recipients(&event, &self.config.email_recipients);
            if recipients.is_empty() {
                tracing::debug!(event_id = %event.id, event_type, "No email recipients, skipping channel");
            } else {
                jobs.push(NotificationJob::email(EmailPayload {
                    recipients,
                    subject: message.subject,
                    body: message.body,
                    event_type: event_type.to_string(),
                    event_id: event.id.clone(),
                }));
            }
        }

        if let Some(message) = chat_message(&event) {
            if self.config.chat_numbers.is_empty() {
                tracing::debug!(event_id = %event.id, event_type, "No chat numbers, skipping channel");
            } else {
                jobs.push(NotificationJob::chat(ChatPayload {
                    numbers: self.config.chat_numbers.clone(),
                    message,
                    event_type: event_type.to_string(),
                    event_id: event.id.clone(),
                }));
            }
        }

        let subscribers = self.subscriptions.for_event(event_type);
        if !subscribers.is_empty() {
            let envelope = WebhookEnvelope {
                id: event.id.clone(),
                event: event_type.to_string(),
                triggered_at: event.triggered_at,
                data: event.data(),
            };
            for subscription in subscribers {
                jobs.push(NotificationJob::webhook(WebhookPayload {
                    subscription,
                    envelope: envelope.clone(),
                }));
            }
        }

        let job_count = jobs.len();
        for job in jobs {
            tracing::debug!(
                channel = %job.channel,
                dedupe_key = %job.dedupe_key,
                "Notification job enqueued"
            );
            self.queue.enqueue(job);
        }
        self.update_gauges();

        tracing::info!(
            event_id = %event.id,
            event_type,
            jobs = job_count,
            "Notification event published"
        );

        event
    }

    /// Resolve once every enqueued job has reached a terminal outcome
    pub async fn wait_for_queue_idle(&self) {
        self.queue.on_idle().await;
        self.update_gauges();
    }

    pub fn email_history(&self) -> Vec<EmailDispatchRecord> {
        self.worker().email.history()
    }

    pub fn chat_history(&self) -> Vec<ChatDispatchRecord> {
        self.worker().chat.history()
    }

    pub fn webhook_history(&self) -> Vec<WebhookDispatchRecord> {
        self.worker().webhook.history()
    }

    /// Drop every channel's dispatch history
    pub fn clear_histories(&self) {
        let worker = self.worker();
        worker.email.clear_history();
        worker.chat.clear_history();
        worker.webhook.clear_history();
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Zero this instance's counters
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.worker().dead_letters.list()
    }

    /// Move a dead letter back to the head of the queue with a fresh attempt
    /// budget. Returns false if no entry has this id.
    pub fn retry_dead_letter(&self, id: Uuid) -> bool {
        let Some(entry) = self.worker().dead_letters.take(id) else {
            return false;
        };

        let channel = entry.job.channel;
        self.metrics.record_manual_retry(channel);
        let job_id = self.queue.enqueue_front(entry.job);
        self.update_gauges();

        tracing::info!(
            dead_letter_id = %id,
            job_id = %job_id,
            channel = %channel,
            previous_attempts = entry.attempts,
            "Dead letter re-enqueued"
        );
        true
    }

    /// Webhook subscription registry
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    fn worker(&self) -> &DeliveryWorker {
        self.queue.handler()
    }

    fn update_gauges(&self) {
        QueueMetrics::update(self.queue.stats().pending, self.worker().dead_letters.len());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    use super::*;
    use crate::channels::{Channel, OutgoingEmail};
    use crate::notification::types::*;

    /// Email transport that fails the first `fail_first` calls
    #[derive(Default)]
    struct FlakyEmail {
        fail_first: AtomicUsize,
        calls: AtomicUsize,
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    impl FlakyEmail {
        fn failing(n: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_first: AtomicUsize::new(n),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl EmailTransport for FlakyEmail {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), ChannelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(ChannelError::transport("smtp unavailable"));
            }
            self.sent.lock().push(email.clone());
            Ok(())
        }
    }

    /// Email transport whose first send panics
    #[derive(Default)]
    struct CrashOnceEmail {
        crashed: AtomicBool,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl EmailTransport for CrashOnceEmail {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), ChannelError> {
            if !self.crashed.swap(true, Ordering::SeqCst) {
                panic!("smtp client crashed");
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.notifications.email_recipients = vec!["staff@ngo.org".to_string()];
        settings.queue.concurrency = 2;
        settings.queue.max_attempts = 3;
        settings.queue.backoff_ms = 5;
        settings
    }

    fn orchestrator(email: Arc<FlakyEmail>) -> NotificationOrchestrator {
        NotificationOrchestrator::new(
            &settings(),
            Transports {
                email,
                ..Transports::default()
            },
        )
    }

    fn beneficiary_created() -> NotificationEvent {
        NotificationEvent::new(EventKind::BeneficiaryCreated(BeneficiaryCreated {
            beneficiary_id: "b-1".to_string(),
            beneficiary_name: Some("Ana".to_string()),
        }))
    }

    #[tokio::test]
    async fn test_publish_returns_normalized_event() {
        let orchestrator = orchestrator(FlakyEmail::failing(0));
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();

        let event = orchestrator.publish(beneficiary_created().with_id("evt-1").triggered_at(at));
        assert_eq!(event.id, "evt-1");
        assert_eq!(event.triggered_at, at);

        orchestrator.wait_for_queue_idle().await;
        assert_eq!(orchestrator.email_history().len(), 1);
        assert!(orchestrator.queue_stats().pending == 0);
    }

    #[tokio::test]
    async fn test_retry_then_success_counts_retries() {
        let email = FlakyEmail::failing(2);
        let orchestrator = orchestrator(email.clone());

        orchestrator.publish(beneficiary_created());
        orchestrator.wait_for_queue_idle().await;

        let metrics = orchestrator.metrics_snapshot().channel(Channel::Email);
        assert_eq!(metrics.delivered, 1);
        assert_eq!(metrics.failed, 2);
        assert_eq!(metrics.retries, 2);
        assert_eq!(metrics.dead_lettered, 0);
        assert_eq!(email.calls.load(Ordering::SeqCst), 3);
        assert!(orchestrator.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_dead_letter_and_manual_retry() {
        let email = FlakyEmail::failing(3);
        let orchestrator = orchestrator(email.clone());

        orchestrator.publish(beneficiary_created().with_id("evt-9"));
        orchestrator.wait_for_queue_idle().await;

        let dead = orchestrator.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);
        assert_eq!(dead[0].job.event_id, "evt-9");
        assert!(dead[0].error.contains("smtp unavailable"));
        assert!(orchestrator.email_history().is_empty());

        assert!(orchestrator.retry_dead_letter(dead[0].id));
        assert!(!orchestrator.retry_dead_letter(dead[0].id));
        orchestrator.wait_for_queue_idle().await;

        assert!(orchestrator.dead_letters().is_empty());
        assert_eq!(email.sent.lock().len(), 1);
        let metrics = orchestrator.metrics_snapshot().channel(Channel::Email);
        assert_eq!(metrics.delivered, 1);
        assert_eq!(metrics.dead_lettered, 1);
        // two automatic, one manual
        assert_eq!(metrics.retries, 3);
    }

    #[tokio::test]
    async fn test_panicked_send_releases_dedupe_claim() {
        let email = Arc::new(CrashOnceEmail::default());
        let orchestrator = NotificationOrchestrator::new(
            &settings(),
            Transports {
                email: email.clone(),
                ..Transports::default()
            },
        );

        orchestrator.publish(beneficiary_created().with_id("evt-crash"));
        orchestrator.wait_for_queue_idle().await;

        // The retry is a real send, not a duplicate of the crashed attempt
        assert_eq!(email.sent.load(Ordering::SeqCst), 1);
        let metrics = orchestrator.metrics_snapshot().channel(Channel::Email);
        assert_eq!(metrics.delivered, 1);
        assert_eq!(metrics.duplicates, 0);
        assert_eq!(metrics.retries, 1);
        assert!(orchestrator.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_dead_letter_id() {
        let orchestrator = orchestrator(FlakyEmail::failing(0));
        assert!(!orchestrator.retry_dead_letter(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_reset_metrics() {
        let orchestrator = orchestrator(FlakyEmail::failing(0));
        orchestrator.publish(beneficiary_created());
        orchestrator.wait_for_queue_idle().await;
        assert_eq!(orchestrator.metrics_snapshot().channel(Channel::Email).delivered, 1);

        orchestrator.reset_metrics();
        assert_eq!(orchestrator.metrics_snapshot().channel(Channel::Email).delivered, 0);
        // Histories are separate from metrics
        assert_eq!(orchestrator.email_history().len(), 1);
        orchestrator.clear_histories();
        assert!(orchestrator.email_history().is_empty());
    }

    #[tokio::test]
    async fn test_no_targets_means_no_jobs() {
        let email = FlakyEmail::failing(0);
        let mut settings = settings();
        settings.notifications.email_recipients.clear();
        let orchestrator = NotificationOrchestrator::new(
            &settings,
            Transports {
                email: email.clone(),
                ..Transports::default()
            },
        );

        orchestrator.publish(beneficiary_created());
        assert!(orchestrator.queue_stats().pending == 0);
        orchestrator.wait_for_queue_idle().await;
        assert_eq!(email.calls.load(Ordering::SeqCst), 0);
    }
}
