//! Worker fetch interception over real HTTP

use async_trait::async_trait;
use offline_relay::client::sync::{NetworkMonitor, NetworkStatus};
use offline_relay::shared::{AppConfig, SyncError, SyncResult};
use offline_relay::worker::fetch::{FetchRequest, FetchResponse, Fetcher, HttpFetcher};
use offline_relay::worker::{BackgroundWorker, WorkerConfig, WorkerHandle};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::MockRemote;

/// HTTP fetcher that can be cut off
#[derive(Default)]
struct Switchable {
    inner: HttpFetcher,
    offline: AtomicBool,
}

#[async_trait]
impl Fetcher for Switchable {
    async fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::network("offline"));
        }
        self.inner.fetch(request).await
    }
}

async fn server() -> MockServer {
    let server = MockServer::start().await;
    for (route, body) in [("/", "shell"), ("/index.html", "shell"), ("/about", "about")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/html"),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;
    server
}

fn worker(server: &MockServer, fetcher: Arc<Switchable>) -> WorkerHandle {
    let app = AppConfig::builder().server_url(server.uri()).build().unwrap();
    BackgroundWorker::spawn(
        WorkerConfig::from_app(&app),
        fetcher,
        Arc::new(MockRemote::new()),
        Arc::new(NetworkMonitor::new(NetworkStatus::Online)),
    )
}

#[tokio::test]
async fn test_cached_page_served_offline() {
    let server = server().await;
    let fetcher = Arc::new(Switchable::default());
    let worker = worker(&server, Arc::clone(&fetcher));
    let about = FetchRequest::document(format!("{}/about", server.uri()));

    let live = worker.fetch(about.clone()).await.unwrap();
    assert_eq!(live.body, "about");
    assert_eq!(live.content_type.as_deref(), Some("text/html"));

    fetcher.offline.store(true, Ordering::SeqCst);
    let cached = worker.fetch(about).await.unwrap();
    assert_eq!(cached, live);
}

#[tokio::test]
async fn test_shell_precached_and_used_as_document_fallback() {
    let server = server().await;
    let fetcher = Arc::new(Switchable::default());
    let worker = worker(&server, Arc::clone(&fetcher));

    // any round trip waits for the pre-cache to finish
    worker
        .fetch(FetchRequest::get(format!("{}/about", server.uri())))
        .await
        .unwrap();
    fetcher.offline.store(true, Ordering::SeqCst);
    let page = worker
        .fetch(FetchRequest::document(format!("{}/never-visited", server.uri())))
        .await
        .unwrap();
    assert_eq!(page.status, 200);
    assert_eq!(page.body, "shell");
    assert_eq!(worker.cached_responses().await, 3);
}

#[tokio::test]
async fn test_offline_fallbacks_by_destination() {
    let server = server().await;
    let fetcher = Arc::new(Switchable::default());
    fetcher.offline.store(true, Ordering::SeqCst);
    let worker = worker(&server, fetcher);

    let image = worker
        .fetch(FetchRequest::image(format!("{}/api/images/1.png", server.uri())))
        .await
        .unwrap();
    assert_eq!(image.content_type.as_deref(), Some("image/svg+xml"));

    let api = worker
        .fetch(FetchRequest::get(format!("{}/api/posts", server.uri())))
        .await
        .unwrap();
    assert_eq!(api.status, 503);
    assert_eq!(api.body, "Offline");
}

#[tokio::test]
async fn test_excluded_paths_bypass_cache() {
    let server = server().await;
    let fetcher = Arc::new(Switchable::default());
    let worker = worker(&server, Arc::clone(&fetcher));
    let login = FetchRequest {
        method: "POST".to_string(),
        url: format!("{}/api/auth/login", server.uri()),
        destination: Default::default(),
    };

    let before = {
        worker.fetch(login.clone()).await.unwrap();
        worker.cached_responses().await
    };
    worker.fetch(login.clone()).await.unwrap();
    assert_eq!(worker.cached_responses().await, before);

    fetcher.offline.store(true, Ordering::SeqCst);
    assert!(worker.fetch(login).await.is_err());
}

#[tokio::test]
async fn test_cached_page_not_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_string("about"))
        .expect(1)
        .mount(&server)
        .await;
    let worker = worker(&server, Arc::new(Switchable::default()));
    let about = FetchRequest::document(format!("{}/about", server.uri()));

    let first = worker.fetch(about.clone()).await.unwrap();
    let second = worker.fetch(about).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second.body, "about");

    server.verify().await;
}
