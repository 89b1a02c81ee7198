//! Generic in-memory job queue.
//!
//! A bounded-concurrency async task runner with fixed-backoff retry and a
//! terminal-failure hook. It knows nothing about notifications: callers
//! supply a [`JobHandler`] that executes attempts and reacts to retries and
//! exhausted jobs.
//!
//! # Lifecycle
//!
//! - `enqueue` appends a job; it starts as soon as a worker slot is free
//! - a failed attempt sleeps for the backoff and re-enters at the tail
//! - after `max_attempts` failures the job goes to `on_error` and is dropped
//! - `on_idle` resolves when nothing is queued, running, or backing off
//!
//! State lives only in memory; jobs are lost when the process exits.

mod job;
mod job_queue;

pub use job::{Job, JobHandler, JobId, JobPanic, JobQueueConfig};
pub use job_queue::{JobQueue, QueueStats};
