//! # Queue Bookkeeping
//!
//! Drain guards, drain outcomes and the statistics/health reports exposed by
//! the queue manager.
//!
//! ## Drain guards
//!
//! Each collection has one atomic flag. [`DrainLocks::try_acquire`] sets it
//! and hands back a [`DrainGuard`] that clears it on drop, so an early return
//! or an error inside a drain never leaves the collection locked. The flag is
//! advisory within one manager only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::shared::event::DrainSummary;
use crate::shared::operation::{Collection, OperationStatus, QueuedOperation};

/// Per-collection "drain in progress" flags
#[derive(Debug, Default)]
pub struct DrainLocks {
    posts: AtomicBool,
    auth: AtomicBool,
}

impl DrainLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn flag(&self, collection: Collection) -> &AtomicBool {
        match collection {
            Collection::PendingPosts => &self.posts,
            Collection::PendingAuth => &self.auth,
        }
    }

    /// Take the flag for `collection`, or `None` if a drain already holds it
    pub fn try_acquire(self: &Arc<Self>, collection: Collection) -> Option<DrainGuard> {
        self.flag(collection)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard {
                locks: Arc::clone(self),
                collection,
            })
    }

    pub fn is_locked(&self, collection: Collection) -> bool {
        self.flag(collection).load(Ordering::Acquire)
    }
}

/// Releases its collection's drain flag when dropped
#[derive(Debug)]
pub struct DrainGuard {
    locks: Arc<DrainLocks>,
    collection: Collection,
}

impl DrainGuard {
    pub fn collection(&self) -> Collection {
        self.collection
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.locks.flag(self.collection).store(false, Ordering::Release);
    }
}

/// Result of a drain request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The drain ran (possibly over an empty queue, or skipped while offline)
    Completed(DrainSummary),
    /// Another drain of this collection was already running
    Busy,
}

impl DrainOutcome {
    pub fn summary(&self) -> Option<DrainSummary> {
        match self {
            DrainOutcome::Completed(summary) => Some(*summary),
            DrainOutcome::Busy => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, DrainOutcome::Busy)
    }
}

/// Counters for one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub collection: Collection,
    pub total: usize,
    pub pending: usize,
    pub failed: usize,
    pub total_attempts: u64,
}

impl CollectionStats {
    pub fn from_records(collection: Collection, records: &[QueuedOperation]) -> Self {
        Self {
            collection,
            total: records.len(),
            pending: count_by_status(records, OperationStatus::Pending),
            failed: count_by_status(records, OperationStatus::Failed),
            total_attempts: records.iter().map(|r| u64::from(r.attempts)).sum(),
        }
    }
}

/// Counters for every collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub collections: Vec<CollectionStats>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

impl QueueStats {
    pub fn for_collection(&self, collection: Collection) -> Option<&CollectionStats> {
        self.collections.iter().find(|s| s.collection == collection)
    }

    pub fn pending(&self) -> usize {
        self.collections.iter().map(|s| s.pending).sum()
    }

    pub fn failed(&self) -> usize {
        self.collections.iter().map(|s| s.failed).sum()
    }
}

/// Store health report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    pub healthy: bool,
    /// Backend currently taking writes
    pub backend: &'static str,
    pub schema_version: Option<i32>,
    pub collections: Vec<&'static str>,
    pub error: Option<String>,
}

pub fn count_by_status(records: &[QueuedOperation], status: OperationStatus) -> usize {
    records.iter().filter(|r| r.status == status).count()
}
