//! Throwaway store fixtures
//!
//! Every fixture owns a `TempDir`; the directory and the database inside it
//! are removed when the fixture is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use offline_relay::client::local_db::{BlobStore, LocalDatabase, OperationStore};
use offline_relay::client::offline::{QueueManager, RetryPolicy};
use offline_relay::client::sync::{NetworkMonitor, NetworkStatus};
use offline_relay::shared::{
    Collection, OperationPayload, PostPayload, QueuedOperation, RemoteService, SyncError,
    SyncResult,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const BASE_URL: &str = "http://127.0.0.1:3000";

pub struct QueueFixture {
    pub queue: Arc<QueueManager>,
    pub network: Arc<NetworkMonitor>,
    pub dir: TempDir,
}

/// Queue manager over SQLite plus the blob fallback
pub async fn sqlite_queue(remote: Arc<dyn RemoteService>, status: NetworkStatus) -> QueueFixture {
    let dir = TempDir::new().unwrap();
    let db = LocalDatabase::open(dir.path().join("queue.db")).await.unwrap();
    let primary: Arc<dyn OperationStore> = Arc::new(db);
    build(Some(primary), remote, status, dir)
}

/// Queue manager with only the blob store
pub fn blob_queue(remote: Arc<dyn RemoteService>, status: NetworkStatus) -> QueueFixture {
    let dir = TempDir::new().unwrap();
    build(None, remote, status, dir)
}

/// Queue manager whose primary store can be made to fail on demand
pub fn flaky_queue(
    remote: Arc<dyn RemoteService>,
    status: NetworkStatus,
) -> (QueueFixture, Arc<FlakyStore>) {
    let dir = TempDir::new().unwrap();
    let flaky = Arc::new(FlakyStore::new(BlobStore::new(dir.path().join("primary"))));
    let primary: Arc<dyn OperationStore> = flaky.clone();
    (build(Some(primary), remote, status, dir), flaky)
}

/// Blob store with switchable read and write failures
#[derive(Debug)]
pub struct FlakyStore {
    inner: BlobStore,
    pub fail_add: AtomicBool,
    pub fail_get_all: AtomicBool,
    pub fail_update: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: BlobStore) -> Self {
        Self {
            inner,
            fail_add: AtomicBool::new(false),
            fail_get_all: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
        }
    }

    pub fn fail(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    /// Records as stored, bypassing the failure switches
    pub async fn records(&self, collection: Collection) -> Vec<QueuedOperation> {
        self.inner.get_all(collection).await.unwrap()
    }

    fn check(flag: &AtomicBool, op: &str) -> SyncResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(SyncError::storage(format!("{} failed: disk I/O error", op)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OperationStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn add(&self, collection: Collection, record: &QueuedOperation) -> SyncResult<i64> {
        Self::check(&self.fail_add, "add")?;
        self.inner.add(collection, record).await
    }

    async fn get_all(&self, collection: Collection) -> SyncResult<Vec<QueuedOperation>> {
        Self::check(&self.fail_get_all, "get_all")?;
        self.inner.get_all(collection).await
    }

    async fn update(&self, collection: Collection, record: &QueuedOperation) -> SyncResult<i64> {
        Self::check(&self.fail_update, "update")?;
        self.inner.update(collection, record).await
    }

    async fn delete(&self, collection: Collection, key: i64) -> SyncResult<()> {
        self.inner.delete(collection, key).await
    }

    async fn clear(&self, collection: Collection) -> SyncResult<()> {
        self.inner.clear(collection).await
    }

    async fn record_sync(&self, at: DateTime<Utc>) -> SyncResult<()> {
        self.inner.record_sync(at).await
    }

    async fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>> {
        self.inner.last_sync().await
    }
}

fn build(
    primary: Option<Arc<dyn OperationStore>>,
    remote: Arc<dyn RemoteService>,
    status: NetworkStatus,
    dir: TempDir,
) -> QueueFixture {
    let network = Arc::new(NetworkMonitor::new(status));
    let fallback: Arc<dyn OperationStore> = Arc::new(BlobStore::new(dir.path()));
    let queue = QueueManager::new(
        primary,
        fallback,
        remote,
        Arc::clone(&network),
        RetryPolicy::default(),
    );
    QueueFixture {
        queue: Arc::new(queue),
        network,
        dir,
    }
}

pub fn post(title: &str) -> OperationPayload {
    OperationPayload::Post(PostPayload::new(title, "C", "alice", BASE_URL))
}
