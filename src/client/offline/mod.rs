//! # Offline Operation Queue
//!
//! Captures user actions while the remote service is unreachable and replays
//! them once connectivity returns.
//!
//! ## Architecture
//!
//! - **Durable stores**: SQLite when it opens, the JSON blob store otherwise.
//!   Reads always cover both so nothing written to the fallback is stranded.
//! - **Drain guards**: at most one drain per collection inside one manager.
//! - **Retry policy**: attempt ceiling (default 3) plus optional backoff.
//! - **Events**: every mutation is published on a broadcast channel.
//!
//! ## Key Components
//!
//! - `queue.rs`: drain guards, outcomes, statistics
//! - `retry.rs`: retry policy and backoff strategies
//! - `reconciliation.rs`: the per-store replay pass
//! - `actions.rs`: try-online-then-queue dispatcher
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_relay::client::offline::QueueManager;
//! use offline_relay::shared::{Collection, OperationPayload, PostPayload};
//! # use std::sync::Arc;
//! # async fn demo(manager: Arc<QueueManager>) -> offline_relay::shared::SyncResult<()> {
//! let post = PostPayload::new("Title", "Body", "alice", "http://127.0.0.1:3000");
//! manager.enqueue(OperationPayload::Post(post)).await?;
//! let outcome = manager.drain(Collection::PendingPosts).await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod queue;
pub mod reconciliation;
pub mod retry;

pub use actions::{ActionDispatcher, ActionOutcome};
pub use queue::{CollectionStats, DrainGuard, DrainLocks, DrainOutcome, QueueStats, StoreHealth};
pub use retry::{BackoffStrategy, RetryPolicy};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::client::local_db::{BlobStore, DatabaseHandle, OperationStore};
use crate::client::sync::network_monitor::NetworkMonitor;
use crate::shared::config::AppConfig;
use crate::shared::error::SyncResult;
use crate::shared::event::{publish_event, DrainSummary, QueueEvent, QueueEventBroadcast};
use crate::shared::operation::{Collection, OperationPayload, OperationStatus, QueuedOperation};
use crate::shared::remote::RemoteService;
use reconciliation::Reconciler;

const EVENT_CAPACITY: usize = 256;

/// Owns the durable queue and every drain against the remote service
pub struct QueueManager {
    primary: Option<Arc<dyn OperationStore>>,
    fallback: Arc<dyn OperationStore>,
    remote: Arc<dyn RemoteService>,
    network: Arc<NetworkMonitor>,
    policy: RetryPolicy,
    locks: Arc<DrainLocks>,
    events: QueueEventBroadcast,
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("primary", &self.primary.as_ref().map(|s| s.name()))
            .field("fallback", &self.fallback.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl QueueManager {
    pub fn new(
        primary: Option<Arc<dyn OperationStore>>,
        fallback: Arc<dyn OperationStore>,
        remote: Arc<dyn RemoteService>,
        network: Arc<NetworkMonitor>,
        policy: RetryPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            primary,
            fallback,
            remote,
            network,
            policy,
            locks: DrainLocks::new(),
            events,
        }
    }

    /// Open the SQLite store under `config.data_dir`, degrading to the blob
    /// store when it is unavailable
    pub async fn open(
        config: &AppConfig,
        remote: Arc<dyn RemoteService>,
        network: Arc<NetworkMonitor>,
    ) -> Self {
        let handle = DatabaseHandle::new(config.database_path());
        let primary: Option<Arc<dyn OperationStore>> = match handle.get().await {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("[Queue] SQLite unavailable, using blob store only: {}", e);
                None
            }
        };
        let fallback: Arc<dyn OperationStore> = Arc::new(BlobStore::new(&config.data_dir));
        Self::new(primary, fallback, remote, network, RetryPolicy::new(config.max_attempts))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn remote(&self) -> &Arc<dyn RemoteService> {
        &self.remote
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Take the drain guard for `collection` without draining
    pub fn try_lock(&self, collection: Collection) -> Option<DrainGuard> {
        self.locks.try_acquire(collection)
    }

    pub fn is_draining(&self, collection: Collection) -> bool {
        self.locks.is_locked(collection)
    }

    /// Store currently taking writes
    fn active_store(&self) -> &Arc<dyn OperationStore> {
        self.primary.as_ref().unwrap_or(&self.fallback)
    }

    fn stores(&self) -> impl Iterator<Item = &Arc<dyn OperationStore>> {
        self.primary.iter().chain(std::iter::once(&self.fallback))
    }

    async fn read_all(&self, collection: Collection) -> SyncResult<Vec<QueuedOperation>> {
        let mut all = Vec::new();
        for store in self.stores() {
            all.extend(store.get_all(collection).await?);
        }
        Ok(all)
    }

    /// Validate and persist a new pending operation
    pub async fn enqueue(&self, payload: OperationPayload) -> SyncResult<QueuedOperation> {
        payload.validate()?;
        let collection = payload.collection();
        let mut record = QueuedOperation::new(payload);

        let key = match &self.primary {
            Some(primary) => match primary.add(collection, &record).await {
                Ok(key) => key,
                Err(e) => {
                    warn!("[Queue] {} write failed, using {}: {}", primary.name(), self.fallback.name(), e);
                    self.fallback.add(collection, &record).await?
                }
            },
            None => self.fallback.add(collection, &record).await?,
        };
        record.key = Some(key);

        info!("[Queue] Enqueued {} {} into {}", record.kind().as_str(), record.id, collection);
        publish_event(&self.events, QueueEvent::QueueChanged { collection });
        Ok(record)
    }

    /// Every pending record, oldest first within each store
    pub async fn list_pending(&self, collection: Collection) -> SyncResult<Vec<QueuedOperation>> {
        let mut all = self.read_all(collection).await?;
        all.retain(QueuedOperation::is_pending);
        Ok(all)
    }

    /// Every record regardless of status
    pub async fn list_all(&self, collection: Collection) -> SyncResult<Vec<QueuedOperation>> {
        self.read_all(collection).await
    }

    /// Replay every due pending record of `collection`
    pub async fn drain(&self, collection: Collection) -> SyncResult<DrainOutcome> {
        if !self.network.is_online() {
            return Ok(DrainOutcome::Completed(DrainSummary::default()));
        }
        let Some(guard) = self.try_lock(collection) else {
            info!("[Queue] Drain of {} already running", collection);
            return Ok(DrainOutcome::Busy);
        };
        self.drain_locked(&guard).await.map(DrainOutcome::Completed)
    }

    /// Drain while the caller holds the collection's guard
    pub async fn drain_locked(&self, guard: &DrainGuard) -> SyncResult<DrainSummary> {
        let collection = guard.collection();
        let reconciler = Reconciler {
            remote: self.remote.as_ref(),
            policy: self.policy,
            events: &self.events,
        };

        let mut summary = DrainSummary::default();
        for store in self.stores() {
            match reconciler.reconcile_store(store.as_ref(), collection).await {
                Ok(pass) => summary.merge(pass),
                Err(e) => {
                    error!("[Queue] Drain of {} aborted on {}: {}", collection, store.name(), e);
                    return Err(e);
                }
            }
        }

        let at = Utc::now();
        if let Err(e) = self.active_store().record_sync(at).await {
            warn!("[Queue] Could not persist last sync time: {}", e);
        }
        publish_event(&self.events, QueueEvent::DrainCompleted { collection, summary, at });
        Ok(summary)
    }

    /// Reset every failed record to pending with zero attempts, then drain
    pub async fn retry_failed(&self, collection: Collection) -> SyncResult<DrainOutcome> {
        let Some(guard) = self.try_lock(collection) else {
            return Ok(DrainOutcome::Busy);
        };

        let mut reset = 0;
        for store in self.stores() {
            for mut record in store.get_all(collection).await? {
                if record.status == OperationStatus::Failed {
                    record.reset();
                    store.update(collection, &record).await?;
                    reset += 1;
                }
            }
        }
        if reset > 0 {
            info!("[Queue] Reset {} failed records in {}", reset, collection);
            publish_event(&self.events, QueueEvent::QueueChanged { collection });
        }

        if !self.network.is_online() {
            return Ok(DrainOutcome::Completed(DrainSummary::default()));
        }
        self.drain_locked(&guard).await.map(DrainOutcome::Completed)
    }

    /// Delete every failed record; returns how many were removed
    pub async fn clear_failed(&self, collection: Collection) -> SyncResult<usize> {
        let mut removed = 0;
        for store in self.stores() {
            for record in store.get_all(collection).await? {
                if let (OperationStatus::Failed, Some(key)) = (record.status, record.key) {
                    store.delete(collection, key).await?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!("[Queue] Cleared {} failed records from {}", removed, collection);
            publish_event(&self.events, QueueEvent::QueueChanged { collection });
        }
        Ok(removed)
    }

    /// Delete the record with correlation id `id`; returns whether one was found
    pub async fn remove_by_id(&self, collection: Collection, id: &str) -> SyncResult<bool> {
        for store in self.stores() {
            let found = store
                .get_all(collection)
                .await?
                .into_iter()
                .find(|r| r.id == id);
            if let Some(QueuedOperation { key: Some(key), .. }) = found {
                store.delete(collection, key).await?;
                publish_event(
                    &self.events,
                    QueueEvent::OperationRemoved { collection, id: id.to_string() },
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Apply an absolute attempt count reported by the worker. Lower counts
    /// than the stored one are ignored.
    pub async fn apply_attempts(
        &self,
        collection: Collection,
        id: &str,
        attempts: u32,
    ) -> SyncResult<Option<QueuedOperation>> {
        for store in self.stores() {
            let found = store
                .get_all(collection)
                .await?
                .into_iter()
                .find(|r| r.id == id);
            let Some(mut record) = found else {
                continue;
            };

            if record.apply_attempts(attempts, Utc::now(), self.policy.max_attempts) {
                store.update(collection, &record).await?;
                publish_event(
                    &self.events,
                    QueueEvent::AttemptsUpdated {
                        collection,
                        id: record.id.clone(),
                        attempts: record.attempts,
                        status: record.status,
                    },
                );
            }
            return Ok(Some(record));
        }
        Ok(None)
    }

    pub async fn stats(&self) -> SyncResult<QueueStats> {
        let mut collections = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let records = self.read_all(collection).await?;
            collections.push(CollectionStats::from_records(collection, &records));
        }
        let total = collections.iter().map(|s| s.total).sum();
        Ok(QueueStats {
            collections,
            total,
            timestamp: Utc::now(),
        })
    }

    pub async fn health(&self) -> StoreHealth {
        let store = self.active_store();
        let collections = Collection::ALL.iter().map(Collection::as_str).collect();

        let mut error = None;
        for collection in Collection::ALL {
            if let Err(e) = store.get_all(collection).await {
                error = Some(e.to_string());
                break;
            }
        }
        let schema_version = match store.schema_version().await {
            Ok(version) => version,
            Err(e) => {
                error.get_or_insert(e.to_string());
                None
            }
        };

        StoreHealth {
            healthy: error.is_none(),
            backend: store.name(),
            schema_version,
            collections,
            error,
        }
    }

    pub async fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let mut latest = None;
        for store in self.stores() {
            latest = latest.max(store.last_sync().await?);
        }
        Ok(latest)
    }
}
