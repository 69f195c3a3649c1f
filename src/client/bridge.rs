//! # Bridge Client
//!
//! Foreground end of the worker message protocol. It listens to everything
//! the worker broadcasts and applies it to the local queue:
//!
//! - `GET_PENDING_POSTS` becomes a posts drain request on the sync service
//! - `DELETE_PENDING_POST` / `UPDATE_POST_ATTEMPTS` are the worker's answers
//!   to a hand-off and mutate the matching records
//! - `SYNC_COMPLETED` ends a hand-off and releases the posts drain guard
//!
//! During a hand-off the posts guard is held by the client, so a drain
//! triggered meanwhile answers `Busy` instead of replaying the same posts
//! twice. If the worker never answers, the guard is released after the
//! configured timeout.
//!
//! The worker answers hand-offs in the order it receives them, one
//! `SYNC_COMPLETED` each. The client counts completions, so a late answer to
//! a hand-off that already timed out does not release a newer one. This
//! assumes one bridge client per worker.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::offline::{DrainGuard, QueueManager};
use crate::client::sync::SyncHandle;
use crate::shared::error::SyncResult;
use crate::shared::message::BridgeMessage;
use crate::shared::operation::Collection;
use crate::worker::WorkerHandle;

struct Handoff {
    generation: u64,
    _guard: DrainGuard,
}

pub struct BridgeClient {
    worker: WorkerHandle,
    queue: Arc<QueueManager>,
    triggers: SyncHandle,
    handoff_timeout: Duration,
    handoff: Arc<Mutex<Option<Handoff>>>,
    generation: AtomicU64,
    completed: AtomicU64,
}

impl BridgeClient {
    pub fn new(
        worker: WorkerHandle,
        queue: Arc<QueueManager>,
        triggers: SyncHandle,
        handoff_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            worker,
            queue,
            triggers,
            handoff_timeout,
            handoff: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        })
    }

    /// Attach to the worker and start applying its messages
    pub fn attach(self: &Arc<Self>) -> JoinHandle<()> {
        let mut messages = self.worker.subscribe();
        let client = Arc::clone(self);
        tokio::spawn(async move {
            info!("[Bridge] Attached to background worker");
            loop {
                match messages.recv().await {
                    Ok(message) => client.handle(message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[Bridge] Missed {} worker messages", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            info!("[Bridge] Worker channel closed");
        })
    }

    /// Raw receiver for callers that want to watch the worker themselves
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeMessage> {
        self.worker.subscribe()
    }

    /// Ask the worker to signal a posts sync
    pub async fn request_sync(&self) -> SyncResult<()> {
        self.worker
            .post_message(BridgeMessage::RequestSync {
                timestamp: Utc::now(),
            })
            .await
    }

    pub async fn is_handing_off(&self) -> bool {
        self.handoff.lock().await.is_some()
    }

    /// Give every pending post to the worker for replay.
    ///
    /// Returns `None` when a posts drain is already running, otherwise the
    /// number of posts handed off.
    pub async fn hand_off_pending_posts(&self) -> SyncResult<Option<usize>> {
        let Some(guard) = self.queue.try_lock(Collection::PendingPosts) else {
            debug!("[Bridge] Posts drain in progress, skipping hand-off");
            return Ok(None);
        };

        let posts = self.queue.list_pending(Collection::PendingPosts).await?;
        if posts.is_empty() {
            return Ok(Some(0));
        }
        let count = posts.len();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.handoff.lock().await = Some(Handoff {
            generation,
            _guard: guard,
        });

        if let Err(e) = self
            .worker
            .post_message(BridgeMessage::ProcessPendingPosts { posts })
            .await
        {
            self.handoff.lock().await.take();
            return Err(e);
        }
        info!("[Bridge] Handed off {} posts to the worker", count);

        let slot = Arc::clone(&self.handoff);
        let timeout = self.handoff_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut slot = slot.lock().await;
            if slot.as_ref().is_some_and(|h| h.generation == generation) {
                warn!("[Bridge] Hand-off {} timed out, releasing posts", generation);
                *slot = None;
            }
        });

        Ok(Some(count))
    }

    /// Release the pending hand-off if this completion answers it
    async fn complete_handoff(&self) {
        let answered = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let mut slot = self.handoff.lock().await;
        match slot.as_ref() {
            Some(pending) if pending.generation <= answered => *slot = None,
            Some(pending) => debug!(
                "[Bridge] Completion {} is late, hand-off {} still pending",
                answered, pending.generation
            ),
            None => {}
        }
    }

    async fn handle(&self, message: BridgeMessage) {
        let result = match message {
            BridgeMessage::GetPendingPosts { source } => {
                debug!("[Bridge] Worker asked for pending posts ({})", source);
                self.triggers.request(Collection::PendingPosts);
                Ok(())
            }
            BridgeMessage::DeletePendingPost { post_id } => self
                .queue
                .remove_by_id(Collection::PendingPosts, &post_id)
                .await
                .map(|found| {
                    if !found {
                        debug!("[Bridge] Post {} already gone", post_id);
                    }
                }),
            BridgeMessage::UpdatePostAttempts { post_id, attempts } => self
                .queue
                .apply_attempts(Collection::PendingPosts, &post_id, attempts)
                .await
                .map(|_| ()),
            BridgeMessage::SyncCompleted {
                success_count,
                error_count,
                total,
                ..
            } => {
                info!(
                    "[Bridge] Worker sync completed: {}/{} synced, {} failed",
                    success_count, total, error_count
                );
                self.complete_handoff().await;
                Ok(())
            }
            BridgeMessage::PushSubscription { action, endpoint } => {
                info!("[Bridge] Push subscription {:?} for {}", action, endpoint);
                Ok(())
            }
            other => {
                debug!("[Bridge] Ignoring {}", other.type_name());
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("[Bridge] Could not apply worker message: {}", e);
        }
    }
}
