/**
 * offline-relay daemon
 *
 * Wires configuration, the durable queue, the connectivity probe, the
 * background worker, the sync service and the bridge client together, then
 * runs until Ctrl-C.
 */

#[cfg(feature = "daemon")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use offline_relay::client::{ApiClient, BridgeClient, Config, NetworkMonitor, QueueManager, SyncService};
    use offline_relay::shared::RemoteService;
    use offline_relay::worker::fetch::HttpFetcher;
    use offline_relay::worker::{BackgroundWorker, WorkerConfig};
    use std::sync::Arc;
    use std::time::Duration;

    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = Config::load()?;
    let app = config.app().clone();
    tracing::info!("[Startup] Remote service at {}", app.server_url);
    tracing::info!("[Startup] Data directory {}", app.data_dir.display());

    let remote: Arc<dyn RemoteService> = Arc::new(ApiClient::new(config)?);
    let network = Arc::new(NetworkMonitor::default());
    network.probe(remote.as_ref(), app.health_timeout).await;
    let probe = network.spawn_probe_loop(Arc::clone(&remote), app.probe_interval, app.health_timeout);

    let queue = Arc::new(QueueManager::open(&app, Arc::clone(&remote), Arc::clone(&network)).await);
    let health = queue.health().await;
    tracing::info!(
        "[Startup] Queue store: {} (schema {:?}, healthy: {})",
        health.backend,
        health.schema_version,
        health.healthy
    );

    let worker = BackgroundWorker::spawn(
        WorkerConfig::from_app(&app),
        Arc::new(HttpFetcher::default()),
        Arc::clone(&remote),
        Arc::clone(&network),
    );

    let mut sync = SyncService::new(Arc::clone(&queue));
    sync.start()?;

    let bridge = BridgeClient::new(worker.clone(), Arc::clone(&queue), sync.handle(), app.handoff_timeout);
    let listener = bridge.attach();

    if network.is_online() {
        sync.sync_now().await?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("[Shutdown] Ctrl-C received");

    // leave pending posts with the worker while it is still reachable
    if network.is_online() {
        if let Ok(Some(count)) = bridge.hand_off_pending_posts().await {
            if count > 0 {
                let _ = tokio::time::timeout(app.handoff_timeout, async {
                    while bridge.is_handing_off().await {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                })
                .await;
            }
        }
    }

    sync.stop();
    worker.shutdown().await.ok();
    listener.abort();
    probe.abort();

    let stats = queue.stats().await?;
    tracing::info!("[Shutdown] {} operations left in the queue", stats.total);
    Ok(())
}

#[cfg(not(feature = "daemon"))]
fn main() {
    eprintln!("The daemon requires the 'daemon' feature to be enabled.");
    eprintln!("Run with: cargo run --bin offline-relay --features daemon");
    std::process::exit(1);
}
