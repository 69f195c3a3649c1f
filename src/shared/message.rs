/**
 * Bridge Message Protocol
 *
 * Messages exchanged between foreground clients and the background worker.
 * On the wire every message is a JSON object `{ "type": ..., "data": ... }`
 * with SCREAMING_SNAKE_CASE type names and camelCase data fields.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::operation::QueuedOperation;

/// Push subscription change forwarded to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushAction {
    Subscribe,
    Unsubscribe,
}

/// A `{type, data}` bridge message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    /// Client hands pending posts to the worker for replay
    ProcessPendingPosts { posts: Vec<QueuedOperation> },
    /// Client asks the worker to run the deferred sync
    RequestSync { timestamp: DateTime<Utc> },
    /// Legacy alias of `RequestSync`
    SyncPendingPosts { source: String },
    /// Worker asks clients to drain their pending posts
    GetPendingPosts { source: String },
    /// Worker replayed a handed-off post successfully
    #[serde(rename_all = "camelCase")]
    DeletePendingPost { post_id: String },
    /// Worker failed to replay a handed-off post
    #[serde(rename_all = "camelCase")]
    UpdatePostAttempts { post_id: String, attempts: u32 },
    /// Worker finished a hand-off batch
    #[serde(rename_all = "camelCase")]
    SyncCompleted {
        success_count: usize,
        error_count: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },
    /// Push subscription change
    PushSubscription { action: PushAction, endpoint: String },
}

impl BridgeMessage {
    /// Wire name of the message type
    pub fn type_name(&self) -> &'static str {
        match self {
            BridgeMessage::ProcessPendingPosts { .. } => "PROCESS_PENDING_POSTS",
            BridgeMessage::RequestSync { .. } => "REQUEST_SYNC",
            BridgeMessage::SyncPendingPosts { .. } => "SYNC_PENDING_POSTS",
            BridgeMessage::GetPendingPosts { .. } => "GET_PENDING_POSTS",
            BridgeMessage::DeletePendingPost { .. } => "DELETE_PENDING_POST",
            BridgeMessage::UpdatePostAttempts { .. } => "UPDATE_POST_ATTEMPTS",
            BridgeMessage::SyncCompleted { .. } => "SYNC_COMPLETED",
            BridgeMessage::PushSubscription { .. } => "PUSH_SUBSCRIPTION",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
