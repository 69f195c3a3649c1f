//! Drains against real stores

use crate::common::*;
use crate::{assert_drained, assert_ok};
use offline_relay::client::local_db::{BlobStore, OperationStore};
use offline_relay::client::offline::DrainOutcome;
use offline_relay::client::sync::NetworkStatus;
use offline_relay::shared::{Collection, OperationStatus, QueueEvent, QueuedOperation};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_enqueued_post_is_replayed_and_deleted() {
    let remote = Arc::new(MockRemote::new());
    let f = sqlite_queue(remote.clone(), NetworkStatus::Online).await;

    let record = assert_ok!(f.queue.enqueue(post("T")).await);
    assert!(record.key.is_some());
    let pending = f.queue.list_pending(Collection::PendingPosts).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, record.id);

    let outcome = f.queue.drain(Collection::PendingPosts).await.unwrap();
    assert_drained!(outcome, synced = 1, failed = 0);
    assert!(f.queue.list_pending(Collection::PendingPosts).await.unwrap().is_empty());
    assert_eq!(remote.post_calls(), 1);
    assert!(f.queue.last_sync().await.unwrap().is_some());
}

#[tokio::test]
async fn test_offline_drain_has_no_side_effects() {
    let remote = Arc::new(MockRemote::new());
    let f = sqlite_queue(remote.clone(), NetworkStatus::Offline).await;
    f.queue.enqueue(post("T")).await.unwrap();

    let outcome = f.queue.drain(Collection::PendingPosts).await.unwrap();
    assert_drained!(outcome, synced = 0, failed = 0);
    assert_eq!(remote.post_calls(), 0);

    let records = f.queue.list_all(Collection::PendingPosts).await.unwrap();
    assert_eq!(records[0].attempts, 0);
    assert_eq!(records[0].last_attempt_at, None);
    assert_eq!(f.queue.last_sync().await.unwrap(), None);
}

#[tokio::test]
async fn test_concurrent_drains_one_busy() {
    let remote = Arc::new(MockRemote::new());
    remote.gate_posts();
    let f = sqlite_queue(remote.clone(), NetworkStatus::Online).await;
    f.queue.enqueue(post("T")).await.unwrap();

    let queue = Arc::clone(&f.queue);
    let first = tokio::spawn(async move { queue.drain(Collection::PendingPosts).await });

    tokio::time::timeout(Duration::from_secs(2), async {
        while remote.post_calls() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let second = f.queue.drain(Collection::PendingPosts).await.unwrap();
    assert_eq!(second, DrainOutcome::Busy);
    let untouched = f.queue.list_all(Collection::PendingPosts).await.unwrap();
    assert_eq!(untouched[0].attempts, 0);

    // the other collection is not blocked
    let auth = f.queue.drain(Collection::PendingAuth).await.unwrap();
    assert!(!auth.is_busy());

    remote.release(1);
    let first = first.await.unwrap().unwrap();
    assert_drained!(first, synced = 1, failed = 0);
    assert_eq!(remote.post_calls(), 1);
}

#[tokio::test]
async fn test_three_failures_fail_then_clear() {
    let remote = Arc::new(MockRemote::failing());
    let f = sqlite_queue(remote.clone(), NetworkStatus::Online).await;
    for title in ["a", "b", "c"] {
        f.queue.enqueue(post(title)).await.unwrap();
    }

    for round in 1..=3 {
        let outcome = f.queue.drain(Collection::PendingPosts).await.unwrap();
        assert_drained!(outcome, synced = 0, failed = 3);
        let records = f.queue.list_all(Collection::PendingPosts).await.unwrap();
        assert!(records.iter().all(|r| r.attempts == round));
    }

    let records = f.queue.list_all(Collection::PendingPosts).await.unwrap();
    assert!(records.iter().all(|r| r.status == OperationStatus::Failed));
    assert!(f.queue.list_pending(Collection::PendingPosts).await.unwrap().is_empty());

    // failed records are not replayed again, even once the remote recovers
    remote.set_failing(false);
    let outcome = f.queue.drain(Collection::PendingPosts).await.unwrap();
    assert_drained!(outcome, synced = 0, failed = 0);
    assert_eq!(remote.post_calls(), 9);

    let stats = f.queue.stats().await.unwrap();
    let posts = stats.for_collection(Collection::PendingPosts).unwrap();
    assert_eq!((posts.failed, posts.total_attempts), (3, 9));

    assert_eq!(f.queue.clear_failed(Collection::PendingPosts).await.unwrap(), 3);
    assert!(f.queue.list_all(Collection::PendingPosts).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_failed_resets_and_drains() {
    let remote = Arc::new(MockRemote::failing());
    let f = sqlite_queue(remote.clone(), NetworkStatus::Online).await;
    f.queue.enqueue(post("T")).await.unwrap();
    for _ in 0..3 {
        f.queue.drain(Collection::PendingPosts).await.unwrap();
    }

    remote.set_failing(false);
    let outcome = f.queue.retry_failed(Collection::PendingPosts).await.unwrap();
    assert_drained!(outcome, synced = 1, failed = 0);
    assert!(f.queue.list_all(Collection::PendingPosts).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_records_in_fallback_store_are_drained() {
    let remote = Arc::new(MockRemote::new());
    let f = sqlite_queue(remote.clone(), NetworkStatus::Online).await;

    // a record left behind in the blob store while SQLite was unavailable
    let blob = BlobStore::new(f.dir.path());
    let stranded = QueuedOperation::new(post("stranded"));
    blob.add(Collection::PendingPosts, &stranded).await.unwrap();
    f.queue.enqueue(post("fresh")).await.unwrap();

    assert_eq!(f.queue.list_pending(Collection::PendingPosts).await.unwrap().len(), 2);
    let outcome = f.queue.drain(Collection::PendingPosts).await.unwrap();
    assert_drained!(outcome, synced = 2, failed = 0);
    assert!(blob.get_all(Collection::PendingPosts).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_events_follow_the_drain() {
    let remote = Arc::new(MockRemote::new());
    let f = blob_queue(remote, NetworkStatus::Online);
    let mut events = f.queue.subscribe();

    let record = f.queue.enqueue(post("T")).await.unwrap();
    f.queue.drain(Collection::PendingPosts).await.unwrap();

    assert!(matches!(events.recv().await.unwrap(), QueueEvent::QueueChanged { .. }));
    match events.recv().await.unwrap() {
        QueueEvent::OperationRemoved { id, .. } => assert_eq!(id, record.id),
        other => panic!("unexpected event {:?}", other),
    }
    match events.recv().await.unwrap() {
        QueueEvent::DrainCompleted { summary, .. } => assert_eq!(summary.synced, 1),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_health_reports_active_backend() {
    let remote = Arc::new(MockRemote::new());
    let sqlite = sqlite_queue(remote.clone(), NetworkStatus::Offline).await;
    let health = sqlite.queue.health().await;
    assert!(health.healthy);
    assert_eq!(health.backend, "sqlite");
    assert_eq!(health.schema_version, Some(2));
    assert_eq!(health.collections, vec!["pending_auth_operations", "pending_posts"]);

    let blob = blob_queue(remote, NetworkStatus::Offline);
    let health = blob.queue.health().await;
    assert_eq!(health.backend, "blob");
    assert_eq!(health.schema_version, None);
}
