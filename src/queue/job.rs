//! Job envelope and handler contract for the job queue.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::QueueConfig;

/// Identifier assigned to a job at enqueue time
pub type JobId = Uuid;

/// A unit of work owned by the queue from enqueue until its terminal outcome
#[derive(Debug, Clone, Serialize)]
pub struct Job<T> {
    /// Unique job ID
    pub id: JobId,
    /// Caller-supplied payload
    pub payload: T,
    /// Number of failed attempts so far
    pub attempts: u32,
    /// When the job first entered the queue
    pub enqueued_at: DateTime<Utc>,
}

impl<T> Job<T> {
    pub(crate) fn new(payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Runtime configuration of a [`JobQueue`](super::JobQueue)
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// Maximum number of jobs executing at once (at least 1)
    pub concurrency: usize,
    /// Attempts before the job is handed to `on_error` (at least 1)
    pub max_attempts: u32,
    /// Fixed delay before a failed job is re-appended to the queue
    pub backoff: Duration,
}

impl JobQueueConfig {
    pub fn new(concurrency: usize, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for JobQueueConfig {
    fn from(config: &QueueConfig) -> Self {
        Self::new(config.concurrency, config.max_attempts, config.backoff())
    }
}

/// A handler panicked while processing a job.
///
/// Panics count as a failed attempt, so handler error types must be
/// constructible from one.
#[derive(Debug, Clone)]
pub struct JobPanic(pub String);

impl JobPanic {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self(message)
    }
}

impl fmt::Display for JobPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler panicked: {}", self.0)
    }
}

/// Work performed by the queue for every attempt of every job.
///
/// `on_retry` and `on_error` are the queue's lifecycle hooks. They run on the
/// worker task that owns the job, so two hooks for the same job never run
/// concurrently; hooks for different jobs may interleave.
#[async_trait]
pub trait JobHandler<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    type Error: fmt::Display + From<JobPanic> + Send + Sync + 'static;

    /// Execute one attempt of the job
    async fn handle(&self, job: &Job<T>) -> Result<(), Self::Error>;

    /// A failed attempt that will be retried after the backoff
    fn on_retry(&self, _job: &Job<T>, _error: &Self::Error) {}

    /// The final failed attempt; the job is dropped afterwards
    fn on_error(&self, _job: Job<T>, _error: Self::Error) {}
}
