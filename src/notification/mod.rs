//! Notification orchestration.
//!
//! Domain modules call [`NotificationOrchestrator::publish`] after a state
//! change commits. The orchestrator:
//! - stamps the event with an id and timestamp
//! - renders an email and/or chat message (see [`messages`])
//! - builds one job per eligible channel, plus one per matching webhook
//!   subscription, each with a deterministic dedupe key
//! - hands the jobs to the shared job queue
//!
//! Workers skip jobs whose dedupe key already succeeded, count retries and
//! park exhausted jobs in the dead-letter list for manual retry.

mod dead_letter;
mod dedupe;
mod job;
pub mod messages;
mod orchestrator;
mod types;

pub use dead_letter::{DeadLetterEntry, DeadLetterStore};
pub use dedupe::{dedupe_key, target_key};
pub use job::{ChannelPayload, NotificationJob};
pub use messages::EmailMessage;
pub use orchestrator::{NotificationOrchestrator, Transports};
pub use types::{
    ActionItemDueSoon, ActionItemOverdue, BeneficiaryCreated, ConsentUpdated, EnrollmentCreated,
    EnrollmentStatusChanged, EventKind, FormSubmissionCreated, NotificationEvent,
    PasswordResetRequested, PublishedEvent,
};
