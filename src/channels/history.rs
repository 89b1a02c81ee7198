use std::collections::VecDeque;

use parking_lot::Mutex;

/// Bounded in-memory log of dispatch records; the oldest record is dropped
/// when the limit is reached.
#[derive(Debug)]
pub struct DispatchHistory<R> {
    records: Mutex<VecDeque<R>>,
    limit: usize,
}

impl<R: Clone> DispatchHistory<R> {
    pub fn new(limit: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    pub fn push(&self, record: R) {
        let mut records = self.records.lock();
        if records.len() >= self.limit {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Records, oldest first
    pub fn list(&self) -> Vec<R> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}
