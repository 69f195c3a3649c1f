//! # Store Reconciliation
//!
//! Replays the pending records of one store against the remote service and
//! writes the outcome of each replay back before moving to the next record.
//!
//! Record failures are absorbed into the summary. A failing store read or
//! write aborts the pass with `Err`.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::client::local_db::store::OperationStore;
use crate::client::offline::retry::RetryPolicy;
use crate::shared::error::SyncResult;
use crate::shared::event::{publish_event, DrainSummary, QueueEvent, QueueEventBroadcast};
use crate::shared::operation::{Collection, OperationStatus, QueuedOperation};
use crate::shared::remote::{RemoteService, ReplayResponse};

/// One reconciliation pass over a store
pub struct Reconciler<'a> {
    pub remote: &'a dyn RemoteService,
    pub policy: RetryPolicy,
    pub events: &'a QueueEventBroadcast,
}

impl Reconciler<'_> {
    pub async fn reconcile_store(
        &self,
        store: &dyn OperationStore,
        collection: Collection,
    ) -> SyncResult<DrainSummary> {
        let records = store.get_all(collection).await?;
        let mut summary = DrainSummary::default();

        for record in &records {
            if record.status == OperationStatus::Completed {
                if let Some(key) = record.key {
                    debug!("[Reconcile] Sweeping completed record {} from {}", record.id, collection);
                    store.delete(collection, key).await?;
                }
            }
        }

        for record in records.into_iter().filter(QueuedOperation::is_pending) {
            if record.key.is_none() {
                continue;
            }
            if !self.policy.is_due(&record, Utc::now()) {
                debug!("[Reconcile] {} not due yet, skipping", record.id);
                continue;
            }

            summary.total += 1;
            if self.replay_one(store, collection, record).await? {
                summary.synced += 1;
            } else {
                summary.failed += 1;
            }
        }

        if !summary.is_empty() {
            info!(
                "[Reconcile] {} via {}: {} synced, {} failed",
                collection,
                store.name(),
                summary.synced,
                summary.failed
            );
        }
        Ok(summary)
    }

    /// Returns whether the replay succeeded
    async fn replay_one(
        &self,
        store: &dyn OperationStore,
        collection: Collection,
        mut record: QueuedOperation,
    ) -> SyncResult<bool> {
        match self.remote.replay(&record).await {
            Ok(response) => {
                record.status = OperationStatus::Completed;
                store.update(collection, &record).await?;
                if let Some(key) = record.key {
                    store.delete(collection, key).await?;
                }
                publish_event(
                    self.events,
                    QueueEvent::OperationRemoved {
                        collection,
                        id: record.id.clone(),
                    },
                );

                if let ReplayResponse::Auth(auth) = response {
                    self.remote.set_token(Some(auth.token.clone()));
                    publish_event(self.events, QueueEvent::LoginReplayed { user: auth.user });
                }
                Ok(true)
            }
            Err(e) => {
                record.record_failure(Utc::now(), self.policy.max_attempts);
                warn!(
                    "[Reconcile] Replay of {} failed (attempt {}/{}): {}",
                    record.id, record.attempts, self.policy.max_attempts, e
                );
                store.update(collection, &record).await?;
                publish_event(
                    self.events,
                    QueueEvent::AttemptsUpdated {
                        collection,
                        id: record.id.clone(),
                        attempts: record.attempts,
                        status: record.status,
                    },
                );
                Ok(false)
            }
        }
    }
}
