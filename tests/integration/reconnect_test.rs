//! Connectivity-driven replays through the sync service

use crate::common::*;
use offline_relay::client::offline::ActionDispatcher;
use offline_relay::client::sync::{NetworkStatus, SyncService};
use offline_relay::shared::{Collection, LoginPayload, QueueEvent, RegisterPayload};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

async fn wait_for_empty(f: &QueueFixture, collection: Collection) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !f.queue.list_all(collection).await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue was not drained");
}

#[tokio::test]
async fn test_login_queued_offline_replays_once_on_reconnect() {
    let remote = Arc::new(MockRemote::new());
    let f = sqlite_queue(remote.clone(), NetworkStatus::Offline).await;
    let actions = ActionDispatcher::new(Arc::clone(&f.queue));
    let mut events = f.queue.subscribe();

    let outcome = actions
        .login(LoginPayload::new("alice@example.com", "secret", BASE_URL))
        .await
        .unwrap();
    assert!(outcome.is_queued());
    assert_eq!(remote.login_calls(), 0);

    let mut sync = SyncService::new(Arc::clone(&f.queue));
    sync.start().unwrap();

    f.network.set_online(true);
    wait_for_empty(&f, Collection::PendingAuth).await;

    // further edges find nothing left to replay
    f.network.set_online(false);
    f.network.set_online(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(remote.login_calls(), 1);
    assert_eq!(
        remote.current_token().as_deref(),
        Some("token-for-alice@example.com")
    );

    let mut replayed = false;
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::LoginReplayed { user } = event {
            assert_eq!(user.email, "alice@example.com");
            replayed = true;
        }
    }
    assert!(replayed);
    sync.stop();
}

#[tokio::test]
async fn test_auth_drained_before_posts() {
    let remote = Arc::new(MockRemote::new());
    let f = blob_queue(remote.clone(), NetworkStatus::Offline);
    f.queue.enqueue(post("T")).await.unwrap();
    f.queue
        .enqueue(offline_relay::shared::OperationPayload::Register(RegisterPayload::new(
            "alice",
            "alice@example.com",
            "secret",
            BASE_URL,
        )))
        .await
        .unwrap();

    let mut sync = SyncService::new(Arc::clone(&f.queue));
    sync.start().unwrap();
    let mut events = f.queue.subscribe();
    f.network.set_online(true);
    wait_for_empty(&f, Collection::PendingPosts).await;

    let mut order = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::OperationRemoved { collection, .. } = event {
            order.push(collection);
        }
    }
    assert_eq!(order, vec![Collection::PendingAuth, Collection::PendingPosts]);
    assert!(remote.current_token().is_some());
}

#[tokio::test]
async fn test_failed_reconnect_counts_attempts() {
    let remote = Arc::new(MockRemote::failing());
    let f = blob_queue(remote.clone(), NetworkStatus::Offline);
    f.queue.enqueue(post("T")).await.unwrap();

    let mut sync = SyncService::new(Arc::clone(&f.queue));
    sync.start().unwrap();
    f.network.set_online(true);

    let status = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let status = sync.status().await;
            if status.last_summary.is_some_and(|s| s.failed == 1) {
                break status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(status.pending_operations, 1);
    let records = f.queue.list_all(Collection::PendingPosts).await.unwrap();
    assert_eq!(records[0].attempts, 1);
    assert!(records[0].last_attempt_at.is_some());
}
