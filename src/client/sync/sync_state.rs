//! # Sync State Management
//!
//! Snapshot of what the reconciliation loop is doing, for status displays.

use chrono::{DateTime, Utc};

use crate::client::sync::network_monitor::NetworkStatus;
use crate::shared::event::DrainSummary;

/// Recent errors kept in the state
const MAX_RECENT_ERRORS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub is_syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_operations: usize,
    pub failed_operations: usize,
    pub network_status: NetworkStatus,
    pub errors: Vec<String>,
    pub last_summary: Option<DrainSummary>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            is_syncing: false,
            last_sync: None,
            pending_operations: 0,
            failed_operations: 0,
            network_status: NetworkStatus::Offline,
            errors: Vec::new(),
            last_summary: None,
        }
    }
}

impl SyncState {
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        if self.errors.len() > MAX_RECENT_ERRORS {
            let excess = self.errors.len() - MAX_RECENT_ERRORS;
            self.errors.drain(..excess);
        }
    }

    pub fn finish(&mut self, summary: DrainSummary, at: DateTime<Utc>) {
        self.is_syncing = false;
        self.last_sync = Some(at);
        self.last_summary = Some(summary);
    }
}
