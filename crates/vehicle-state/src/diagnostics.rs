//! # Diagnostic Log
//!
//! Bounded, newest-first ring of human readable events describing the
//! connection lifecycle and applied updates. Appending never fails.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of entries retained by default.
pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Shared handle to the diagnostic ring. Clones share the same entries.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl DiagnosticLog {
    /// A log keeping at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))), capacity }
    }

    /// Prepend a timestamped entry, evicting the oldest beyond capacity.
    pub fn append(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "diagnostics", "{message}");

        let mut entries = self.lock();
        entries.push_front(LogEntry { timestamp: Utc::now(), message });
        entries.truncate(self.capacity);
    }

    /// Entries, newest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn latest(&self) -> Option<LogEntry> {
        self.lock().front().cloned()
    }

    /// Whether any retained entry contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|entry| entry.message.contains(needle))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    // a panic while holding the lock cannot leave the ring inconsistent
    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
