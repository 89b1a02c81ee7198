use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::job::NotificationJob;

/// A job that exhausted its retry budget
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub job: NotificationJob,
    /// Error of the final attempt
    pub error: String,
    pub failed_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Dead letters in the order they failed
#[derive(Debug, Default)]
pub struct DeadLetterStore {
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl DeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: NotificationJob, error: String, attempts: u32) -> Uuid {
        let entry = DeadLetterEntry {
            id: Uuid::new_v4(),
            job,
            error,
            failed_at: Utc::now(),
            attempts,
        };
        let id = entry.id;
        self.entries.lock().push(entry);
        id
    }

    pub fn list(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().clone()
    }

    /// Remove and return an entry
    pub fn take(&self, id: Uuid) -> Option<DeadLetterEntry> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|e| e.id == id)?;
        Some(entries.remove(index))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
