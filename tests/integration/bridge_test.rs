//! Foreground and worker wired together the way the daemon does it

use async_trait::async_trait;
use offline_relay::client::offline::ActionDispatcher;
use offline_relay::client::sync::{NetworkStatus, SyncService};
use offline_relay::client::BridgeClient;
use offline_relay::shared::{BridgeMessage, Collection, PostPayload, SyncError, SyncResult};
use offline_relay::worker::fetch::{FetchRequest, FetchResponse, Fetcher};
use offline_relay::worker::registry::BACKGROUND_SYNC_TAG;
use offline_relay::worker::{BackgroundWorker, WorkerConfig, WorkerHandle};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use crate::common::*;

struct NoNet;

#[async_trait]
impl Fetcher for NoNet {
    async fn fetch(&self, _: &FetchRequest) -> SyncResult<FetchResponse> {
        Err(SyncError::network("offline"))
    }
}

fn spawn_worker(f: &QueueFixture, remote: Arc<MockRemote>) -> WorkerHandle {
    BackgroundWorker::spawn(
        WorkerConfig {
            origin: BASE_URL.to_string(),
            shell_assets: vec![],
            excluded_paths: vec![],
            max_restarts: 1,
        },
        Arc::new(NoNet),
        remote,
        Arc::clone(&f.network),
    )
}

async fn wait_for_empty(f: &QueueFixture) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !f.queue.list_all(Collection::PendingPosts).await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("posts were not drained");
}

#[tokio::test]
async fn test_offline_post_synced_once_after_reconnect() {
    let remote = Arc::new(MockRemote::new());
    let f = sqlite_queue(remote.clone(), NetworkStatus::Offline).await;
    let worker = spawn_worker(&f, Arc::clone(&remote));

    let actions = ActionDispatcher::new(Arc::clone(&f.queue)).with_worker(worker.clone());
    let outcome = actions
        .create_post(PostPayload::new("T", "C", "alice", BASE_URL))
        .await
        .unwrap();
    assert!(outcome.is_queued());

    let mut sync = SyncService::new(Arc::clone(&f.queue));
    sync.start().unwrap();
    let bridge = BridgeClient::new(worker.clone(), Arc::clone(&f.queue), sync.handle(), Duration::from_secs(5));
    let listener = bridge.attach();

    // commands are handled in order, so a fetch round trip flushes the registration
    worker.fetch(FetchRequest::get(format!("{}/", BASE_URL))).await.unwrap();
    assert_eq!(worker.registered_tags().await, vec![BACKGROUND_SYNC_TAG.to_string()]);

    // both the reconnect edge and the fired tag ask for a drain
    f.network.set_online(true);
    wait_for_empty(&f).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(remote.post_calls(), 1);
    assert!(worker.registered_tags().await.is_empty());
    listener.abort();
    sync.stop();
}

#[tokio::test]
async fn test_post_failing_while_online_is_retried_without_reconnect() {
    let remote = Arc::new(MockRemote::failing());
    let f = sqlite_queue(remote.clone(), NetworkStatus::Online).await;
    let worker = spawn_worker(&f, Arc::clone(&remote));

    let mut sync = SyncService::new(Arc::clone(&f.queue));
    sync.start().unwrap();
    let bridge = BridgeClient::new(worker.clone(), Arc::clone(&f.queue), sync.handle(), Duration::from_secs(5));
    let listener = bridge.attach();

    let actions = ActionDispatcher::new(Arc::clone(&f.queue)).with_worker(worker.clone());
    let outcome = actions
        .create_post(PostPayload::new("T", "C", "alice", BASE_URL))
        .await
        .unwrap();
    assert!(outcome.is_queued());

    // the tag fires straight away and the drain replays the post once
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let records = f.queue.list_all(Collection::PendingPosts).await.unwrap();
            if records.first().map(|r| r.attempts) == Some(1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queued post was never replayed");

    assert_eq!(remote.post_calls(), 2);
    assert!(worker.registered_tags().await.is_empty());
    listener.abort();
    sync.stop();
}

#[tokio::test]
async fn test_handoff_round_trip() {
    let remote = Arc::new(MockRemote::new());
    let f = sqlite_queue(remote.clone(), NetworkStatus::Offline).await;
    let worker = spawn_worker(&f, Arc::clone(&remote));
    let sync = SyncService::new(Arc::clone(&f.queue));
    let bridge = BridgeClient::new(worker, Arc::clone(&f.queue), sync.handle(), Duration::from_secs(5));
    let mut messages = bridge.subscribe();
    bridge.attach();

    for title in ["a", "b"] {
        f.queue.enqueue(post(title)).await.unwrap();
    }
    assert_eq!(bridge.hand_off_pending_posts().await.unwrap(), Some(2));
    wait_for_empty(&f).await;

    let mut completed = None;
    while completed.is_none() {
        if let BridgeMessage::SyncCompleted { success_count, total, .. } = messages.recv().await.unwrap() {
            completed = Some((success_count, total));
        }
    }
    assert_eq!(completed, Some((2, 2)));
    assert_eq!(remote.post_calls(), 2);
}

#[tokio::test]
async fn test_worker_answers_apply_to_matching_records() {
    let remote = Arc::new(MockRemote::failing());
    let f = blob_queue(remote.clone(), NetworkStatus::Offline);
    let worker = spawn_worker(&f, Arc::clone(&remote));
    let sync = SyncService::new(Arc::clone(&f.queue));
    let bridge = BridgeClient::new(worker, Arc::clone(&f.queue), sync.handle(), Duration::from_secs(5));
    bridge.attach();

    let record = f.queue.enqueue(post("a")).await.unwrap();
    for _ in 0..3 {
        bridge.hand_off_pending_posts().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while bridge.is_handing_off().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    let records = f.queue.list_all(Collection::PendingPosts).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, record.id);
    assert_eq!(records[0].attempts, 3);
    assert_eq!(records[0].status, offline_relay::shared::OperationStatus::Failed);
    assert_eq!(bridge.hand_off_pending_posts().await.unwrap(), Some(0));
}
