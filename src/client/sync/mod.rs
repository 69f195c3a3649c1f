//! # Reconciliation Triggers
//!
//! Decides when the queue is drained. Three triggers converge on
//! [`QueueManager::drain`]:
//!
//! - **Reconnect**: the network monitor's offline → online edge drains the
//!   auth collection first, then posts
//! - **Deferred sync**: the bridge client turns the worker's
//!   `GET_PENDING_POSTS` into a trigger through a [`SyncHandle`]
//! - **Manual**: [`SyncService::sync_now`]
//!
//! Redundant triggers are harmless. A drain already in flight answers `Busy`
//! and a drain of an empty queue does nothing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_relay::client::sync::SyncService;
//! # use std::sync::Arc;
//! # async fn demo(queue: Arc<offline_relay::client::offline::QueueManager>) -> offline_relay::shared::SyncResult<()> {
//! let mut sync = SyncService::new(queue);
//! sync.start()?;
//!
//! let outcomes = sync.sync_now().await?;
//! let status = sync.status().await;
//! println!("pending: {}", status.pending_operations);
//! # let _ = outcomes;
//! # Ok(())
//! # }
//! ```

pub mod network_monitor;
pub mod sync_state;

pub use network_monitor::{NetworkMonitor, NetworkStatus};
pub use sync_state::SyncState;

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::client::offline::{DrainOutcome, QueueManager};
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::operation::Collection;

/// Order collections are drained in on reconnect
pub const RECONNECT_ORDER: [Collection; 2] = [Collection::PendingAuth, Collection::PendingPosts];

const TRIGGER_CAPACITY: usize = 16;

/// Cloneable sender of drain requests into a running [`SyncService`]
#[derive(Debug, Clone)]
pub struct SyncHandle {
    trigger_tx: mpsc::Sender<Collection>,
}

impl SyncHandle {
    /// Ask for a drain of `collection`; false when the request was dropped
    pub fn request(&self, collection: Collection) -> bool {
        match self.trigger_tx.try_send(collection) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("[Sync] Trigger queue full, {} drain already requested", collection);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Drives drains from connectivity edges and explicit triggers
#[derive(Debug)]
pub struct SyncService {
    queue: Arc<QueueManager>,
    state: Arc<RwLock<SyncState>>,
    trigger_tx: mpsc::Sender<Collection>,
    trigger_rx: Arc<Mutex<mpsc::Receiver<Collection>>>,
    background_task: Option<JoinHandle<()>>,
}

impl SyncService {
    pub fn new(queue: Arc<QueueManager>) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CAPACITY);
        let state = SyncState {
            network_status: queue.network().get_status(),
            ..SyncState::default()
        };
        Self {
            queue,
            state: Arc::new(RwLock::new(state)),
            trigger_tx,
            trigger_rx: Arc::new(Mutex::new(trigger_rx)),
            background_task: None,
        }
    }

    /// Start listening for triggers
    pub fn start(&mut self) -> SyncResult<()> {
        if self.is_running() {
            return Err(SyncError::state("Sync service is already running"));
        }

        let queue = Arc::clone(&self.queue);
        let state = Arc::clone(&self.state);
        let triggers = Arc::clone(&self.trigger_rx);
        // subscribe before spawning so an edge right after start() is not missed
        let mut status_rx = self.queue.network().subscribe();
        status_rx.borrow_and_update();
        self.background_task = Some(tokio::spawn(async move {
            Self::trigger_loop(queue, state, triggers, status_rx).await;
        }));
        info!("[Sync] Service started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.background_task.take() {
            handle.abort();
            info!("[Sync] Service stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.background_task
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            trigger_tx: self.trigger_tx.clone(),
        }
    }

    /// Drain auth then posts right away
    pub async fn sync_now(&self) -> SyncResult<Vec<(Collection, DrainOutcome)>> {
        let mut outcomes = Vec::with_capacity(RECONNECT_ORDER.len());
        for collection in RECONNECT_ORDER {
            let outcome = Self::run_drain(&self.queue, &self.state, collection).await?;
            outcomes.push((collection, outcome));
        }
        Ok(outcomes)
    }

    /// Current state with counts and connectivity refreshed
    pub async fn status(&self) -> SyncState {
        Self::refresh(&self.queue, &self.state).await;
        self.state.read().await.clone()
    }

    async fn trigger_loop(
        queue: Arc<QueueManager>,
        state: Arc<RwLock<SyncState>>,
        triggers: Arc<Mutex<mpsc::Receiver<Collection>>>,
        mut status_rx: watch::Receiver<NetworkStatus>,
    ) {
        let mut triggers = triggers.lock().await;
        let mut watching = true;

        loop {
            tokio::select! {
                changed = status_rx.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let status = *status_rx.borrow_and_update();
                    state.write().await.network_status = status;
                    if !status.is_online() {
                        continue;
                    }
                    info!("[Sync] Reconnected, draining queues");
                    for collection in RECONNECT_ORDER {
                        // errors are already recorded in the state
                        let _ = Self::run_drain(&queue, &state, collection).await;
                    }
                }
                trigger = triggers.recv() => match trigger {
                    Some(collection) => {
                        let _ = Self::run_drain(&queue, &state, collection).await;
                    }
                    None => return,
                },
            }
        }
    }

    async fn run_drain(
        queue: &QueueManager,
        state: &RwLock<SyncState>,
        collection: Collection,
    ) -> SyncResult<DrainOutcome> {
        state.write().await.is_syncing = true;
        let result = queue.drain(collection).await;
        let last_sync = queue.last_sync().await.ok().flatten();

        {
            let mut state = state.write().await;
            match &result {
                Ok(DrainOutcome::Completed(summary)) => match last_sync {
                    Some(at) => state.finish(*summary, at),
                    None => {
                        state.is_syncing = false;
                        state.last_summary = Some(*summary);
                    }
                },
                Ok(DrainOutcome::Busy) => {
                    debug!("[Sync] {} drain already in progress", collection);
                    state.is_syncing = false;
                }
                Err(e) => {
                    error!("[Sync] Drain of {} failed: {}", collection, e);
                    state.is_syncing = false;
                    state.record_error(format!("{}: {}", collection, e));
                }
            }
        }

        Self::refresh(queue, state).await;
        result
    }

    async fn refresh(queue: &QueueManager, state: &RwLock<SyncState>) {
        let stats = queue.stats().await;
        let mut state = state.write().await;
        state.network_status = queue.network().get_status();
        match stats {
            Ok(stats) => {
                state.pending_operations = stats.pending();
                state.failed_operations = stats.failed();
            }
            Err(e) => state.record_error(e.to_string()),
        }
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(handle) = self.background_task.take() {
            handle.abort();
        }
    }
}
