//! Queue behavior when the primary store misbehaves

use crate::common::*;
use crate::{assert_drained, assert_err, assert_ok};
use offline_relay::client::local_db::{BlobStore, OperationStore};
use offline_relay::client::sync::NetworkStatus;
use offline_relay::shared::{Collection, SyncError};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn test_enqueue_falls_back_when_primary_add_fails() {
    let remote = Arc::new(MockRemote::new());
    let (f, flaky) = flaky_queue(remote, NetworkStatus::Offline);
    FlakyStore::fail(&flaky.fail_add, true);

    let record = assert_ok!(f.queue.enqueue(post("T")).await);

    assert!(flaky.records(Collection::PendingPosts).await.is_empty());
    let fallback = BlobStore::new(f.dir.path());
    let stored = fallback.get_all(Collection::PendingPosts).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, record.id);

    let pending = f.queue.list_pending(Collection::PendingPosts).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_read_failure_aborts_drain_and_releases_guard() {
    let remote = Arc::new(MockRemote::new());
    let (f, flaky) = flaky_queue(remote.clone(), NetworkStatus::Online);
    f.queue.enqueue(post("a")).await.unwrap();
    f.queue.enqueue(post("b")).await.unwrap();

    FlakyStore::fail(&flaky.fail_get_all, true);
    let result = f.queue.drain(Collection::PendingPosts).await;
    assert_err!(&result, SyncError::StorageFailure { .. });
    assert_eq!(remote.post_calls(), 0);
    assert!(!f.queue.is_draining(Collection::PendingPosts));

    let records = flaky.records(Collection::PendingPosts).await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.attempts == 0));

    FlakyStore::fail(&flaky.fail_get_all, false);
    let outcome = f.queue.drain(Collection::PendingPosts).await.unwrap();
    assert_drained!(outcome, synced = 2, failed = 0);
}

#[tokio::test]
async fn test_write_failure_stops_drain_mid_pass() {
    let remote = Arc::new(MockRemote::failing());
    let (f, flaky) = flaky_queue(remote.clone(), NetworkStatus::Online);
    f.queue.enqueue(post("a")).await.unwrap();
    f.queue.enqueue(post("b")).await.unwrap();

    FlakyStore::fail(&flaky.fail_update, true);
    let result = f.queue.drain(Collection::PendingPosts).await;
    assert_err!(&result, SyncError::StorageFailure { .. });

    // the first replay failed to persist its attempt, the second never ran
    assert_eq!(remote.post_calls(), 1);
    let records = flaky.records(Collection::PendingPosts).await;
    assert!(records.iter().all(|r| r.attempts == 0 && r.is_pending()));
    assert!(!f.queue.is_draining(Collection::PendingPosts));

    FlakyStore::fail(&flaky.fail_update, false);
    let outcome = f.queue.drain(Collection::PendingPosts).await.unwrap();
    assert_drained!(outcome, synced = 0, failed = 2);
    let records = flaky.records(Collection::PendingPosts).await;
    assert!(records.iter().all(|r| r.attempts == 1));
}
