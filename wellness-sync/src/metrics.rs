//! Consumer counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every consumer of a group.
#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    /// Records pulled off the broker
    pub received: AtomicU64,
    /// Events whose snapshot was applied
    pub applied: AtomicU64,
    /// Created events for identities that already existed
    pub duplicates: AtomicU64,
    /// Events referencing identities missing from a store
    pub stale_references: AtomicU64,
    /// Unknown event types
    pub ignored: AtomicU64,
    /// Payloads that could not be decoded
    pub malformed: AtomicU64,
    /// Handler errors (the event is still committed)
    pub handler_failures: AtomicU64,
    /// Transport errors on fetch
    pub fetch_errors: AtomicU64,
    /// Cursors advanced
    pub committed: AtomicU64,
    /// Cursor advances that failed
    pub commit_failures: AtomicU64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ConsumerSnapshot {
        ConsumerSnapshot {
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            stale_references: self.stale_references.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Consumer counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerSnapshot {
    pub received: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub stale_references: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub handler_failures: u64,
    pub fetch_errors: u64,
    pub committed: u64,
    pub commit_failures: u64,
}
