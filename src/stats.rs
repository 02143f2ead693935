use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One executed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub sql: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Affected or returned rows; zero when the statement failed
    pub rows: usize,
    pub error: Option<String>,
}

impl ExecutionRecord {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Insertion-ordered, capacity-bounded record buffer. The oldest record is evicted first.
#[derive(Debug, Clone)]
pub struct StatsBuffer {
    records: VecDeque<ExecutionRecord>,
    capacity: usize,
}

impl StatsBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Shrinking drops the oldest records immediately.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.records.len() > capacity {
            self.records.pop_front();
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ExecutionRecord> {
        self.records.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter()
    }

    /// Copy of the records, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ExecutionRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Summed duration of everything currently held.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.records.iter().map(|r| r.duration).sum()
    }
}
