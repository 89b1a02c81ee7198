//! Bounded-concurrency in-memory job runner.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::job::{Job, JobHandler, JobId, JobPanic, JobQueueConfig};

/// Snapshot of the queue's bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Jobs waiting for a worker slot
    pub queued: usize,
    /// Jobs currently executing
    pub active: usize,
    /// Failed jobs sleeping out their backoff before re-queueing
    pub backing_off: usize,
    /// Sum of the above; the queue is idle when this is zero
    pub pending: usize,
}

struct QueueState<T> {
    queued: VecDeque<Job<T>>,
    active: usize,
    backing_off: usize,
}

impl<T> QueueState<T> {
    fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.queued.len(),
            active: self.active,
            backing_off: self.backing_off,
            pending: self.queued.len() + self.active + self.backing_off,
        }
    }
}

struct QueueInner<T, H> {
    config: JobQueueConfig,
    handler: H,
    state: Mutex<QueueState<T>>,
    /// Outstanding job count, observed by `on_idle` waiters
    pending_tx: watch::Sender<usize>,
    /// Runtime the queue was built on; workers are spawned here
    runtime: Option<Handle>,
}

/// FIFO job queue with a concurrency ceiling and fixed-backoff retry.
///
/// Jobs start in enqueue order as worker slots free up. A failed attempt
/// releases its slot, sleeps for `backoff`, then goes to the tail of the
/// queue. After `max_attempts` failures the job is passed to
/// [`JobHandler::on_error`] and dropped.
///
/// Workers run on the Tokio runtime the queue was created in, so jobs may be
/// enqueued from any thread. A queue created outside a runtime falls back to
/// the caller's runtime at enqueue time.
///
/// # Example
///
/// ```rust,ignore
/// let queue = JobQueue::new(JobQueueConfig::new(4, 3, Duration::from_millis(500)), handler);
/// queue.enqueue(payload);
/// queue.on_idle().await;
/// ```
pub struct JobQueue<T, H> {
    inner: Arc<QueueInner<T, H>>,
}

impl<T, H> Clone for JobQueue<T, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, H> JobQueue<T, H>
where
    T: Send + Sync + 'static,
    H: JobHandler<T>,
{
    pub fn new(config: JobQueueConfig, handler: H) -> Self {
        let config = JobQueueConfig::new(config.concurrency, config.max_attempts, config.backoff);
        let (pending_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(QueueInner {
                config,
                handler,
                state: Mutex::new(QueueState {
                    queued: VecDeque::new(),
                    active: 0,
                    backing_off: 0,
                }),
                pending_tx,
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    pub fn config(&self) -> &JobQueueConfig {
        &self.inner.config
    }

    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    /// Append a job to the tail of the queue
    pub fn enqueue(&self, payload: T) -> JobId {
        self.push(Job::new(payload), false)
    }

    /// Place a job at the head of the queue, ahead of everything waiting
    pub fn enqueue_front(&self, payload: T) -> JobId {
        self.push(Job::new(payload), true)
    }

    /// Resolve once nothing is queued, running, or waiting out a backoff.
    ///
    /// Any number of callers may wait; all are released together.
    pub async fn on_idle(&self) {
        let mut rx = self.inner.pending_tx.subscribe();
        // The sender lives as long as `inner`, which we hold
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.state.lock().stats()
    }

    pub fn is_idle(&self) -> bool {
        self.stats().pending == 0
    }

    fn push(&self, job: Job<T>, front: bool) -> JobId {
        let id = job.id;
        {
            let mut state = self.inner.state.lock();
            if front {
                state.queued.push_front(job);
            } else {
                state.queued.push_back(job);
            }
            self.inner.publish_pending(&state);
        }

        tracing::debug!(job_id = %id, front = front, "Job enqueued");

        QueueInner::pump(&self.inner);
        id
    }
}

impl<T, H> QueueInner<T, H>
where
    T: Send + Sync + 'static,
    H: JobHandler<T>,
{
    fn publish_pending(&self, state: &QueueState<T>) {
        self.pending_tx.send_replace(state.stats().pending);
    }

    /// Start queued jobs until the concurrency ceiling is reached
    fn pump(inner: &Arc<Self>) {
        let Some(runtime) = inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            tracing::error!(
                queued = inner.state.lock().queued.len(),
                "No Tokio runtime to run jobs on; they stay queued"
            );
            return;
        };

        loop {
            let job = {
                let mut state = inner.state.lock();
                if state.active >= inner.config.concurrency {
                    return;
                }
                let Some(job) = state.queued.pop_front() else {
                    return;
                };
                state.active += 1;
                job
            };

            let worker = Arc::clone(inner);
            runtime.spawn(async move {
                worker.run(job).await;
            });
        }
    }

    async fn run(self: Arc<Self>, mut job: Job<T>) {
        let outcome = AssertUnwindSafe(self.handler.handle(&job))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(JobPanic::from_payload(panic).into()),
        };

        let error = match result {
            Ok(()) => {
                tracing::debug!(job_id = %job.id, attempts = job.attempts, "Job completed");
                self.release_slot();
                return;
            }
            Err(error) => error,
        };

        job.attempts += 1;

        if job.attempts >= self.config.max_attempts {
            tracing::warn!(
                job_id = %job.id,
                attempts = job.attempts,
                error = %error,
                "Job exhausted its attempts"
            );
            // The slot is held until the hook returns so idle waiters observe
            // its bookkeeping
            let hook = std::panic::catch_unwind(AssertUnwindSafe(|| {
                self.handler.on_error(job, error);
            }));
            if hook.is_err() {
                tracing::error!("Job error hook panicked; ignoring");
            }
            self.release_slot();
            return;
        }

        tracing::debug!(
            job_id = %job.id,
            attempts = job.attempts,
            max_attempts = self.config.max_attempts,
            backoff_ms = self.config.backoff.as_millis() as u64,
            error = %error,
            "Job failed, scheduling retry"
        );
        let hook = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler.on_retry(&job, &error);
        }));
        if hook.is_err() {
            tracing::error!(job_id = %job.id, "Job retry hook panicked; ignoring");
        }

        {
            let mut state = self.state.lock();
            state.active -= 1;
            state.backing_off += 1;
            self.publish_pending(&state);
        }
        Self::pump(&self);

        tokio::time::sleep(self.config.backoff).await;

        {
            let mut state = self.state.lock();
            state.backing_off -= 1;
            state.queued.push_back(job);
            self.publish_pending(&state);
        }
        Self::pump(&self);
    }

    fn release_slot(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.active -= 1;
            self.publish_pending(&state);
        }
        Self::pump(self);
    }
}
