/**
 * Queue Event System
 *
 * Events emitted by the queue manager whenever a collection changes. Attached
 * foreground clients subscribe to a broadcast channel and receive a copy of
 * every event.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::shared::operation::{Collection, OperationStatus};
use crate::shared::remote::UserInfo;

/// Outcome counters of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainSummary {
    /// Operations replayed and removed
    pub synced: usize,
    /// Operations whose replay failed this round
    pub failed: usize,
    /// Operations attempted this round
    pub total: usize,
}

impl DrainSummary {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn merge(&mut self, other: DrainSummary) {
        self.synced += other.synced;
        self.failed += other.failed;
        self.total += other.total;
    }
}

/// Queue lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A record was added or reset
    QueueChanged { collection: Collection },
    /// A record was replayed and deleted
    OperationRemoved { collection: Collection, id: String },
    /// A replay failed and the attempt counter moved
    AttemptsUpdated {
        collection: Collection,
        id: String,
        attempts: u32,
        status: OperationStatus,
    },
    /// A drain finished
    DrainCompleted {
        collection: Collection,
        summary: DrainSummary,
        at: DateTime<Utc>,
    },
    /// A deferred login succeeded and its token is now active
    LoginReplayed { user: UserInfo },
}

impl QueueEvent {
    pub fn collection(&self) -> Option<Collection> {
        match self {
            QueueEvent::QueueChanged { collection }
            | QueueEvent::OperationRemoved { collection, .. }
            | QueueEvent::AttemptsUpdated { collection, .. }
            | QueueEvent::DrainCompleted { collection, .. } => Some(*collection),
            QueueEvent::LoginReplayed { .. } => None,
        }
    }
}

/// Broadcast channel carrying queue events
pub type QueueEventBroadcast = broadcast::Sender<QueueEvent>;

/// Publish an event to every subscriber
///
/// Returns the number of subscribers that received it (0 if none are attached).
pub fn publish_event(broadcast_tx: &QueueEventBroadcast, event: QueueEvent) -> usize {
    match broadcast_tx.send(event) {
        Ok(subscriber_count) => {
            tracing::debug!("[Queue] Event delivered to {} subscribers", subscriber_count);
            subscriber_count
        }
        Err(_) => 0,
    }
}
