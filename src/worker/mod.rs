//! # Background Worker
//!
//! A supervised tokio task with a lifecycle independent of any foreground
//! client. It intercepts fetches through a read-through cache, keeps the
//! deferred-sync tag registry, and exchanges [`BridgeMessage`]s with clients:
//! commands come in over an `mpsc` channel and messages go out on a
//! `broadcast` channel that every attached client subscribes to.
//!
//! The worker owns no queue data. Deferred-sync signals are forwarded to
//! clients as `GET_PENDING_POSTS`, and the foreground queue manager does the
//! draining. The one exception is an explicit hand-off
//! (`PROCESS_PENDING_POSTS`), where the client gives the worker a batch of
//! posts and applies the worker's per-post answers to its own store.
//!
//! ## Supervision
//!
//! The command loop runs in a child task. If it panics the supervisor starts
//! a new one, up to `max_restarts` times. The cache and the sync registry
//! live outside the child task and survive restarts.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_relay::worker::{BackgroundWorker, WorkerConfig};
//! # use std::sync::Arc;
//! # async fn demo(
//! #     fetcher: Arc<dyn offline_relay::worker::fetch::Fetcher>,
//! #     remote: Arc<dyn offline_relay::shared::RemoteService>,
//! #     network: Arc<offline_relay::client::sync::network_monitor::NetworkMonitor>,
//! # ) -> offline_relay::shared::SyncResult<()> {
//! let config = WorkerConfig::from_app(&offline_relay::shared::AppConfig::default());
//! let worker = BackgroundWorker::spawn(config, fetcher, remote, network);
//! worker.register_sync(offline_relay::worker::registry::BACKGROUND_SYNC_TAG).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod fetch;
pub mod registry;

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::client::sync::network_monitor::NetworkMonitor;
use crate::shared::config::AppConfig;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::message::BridgeMessage;
use crate::shared::operation::{OperationPayload, QueuedOperation};
use crate::shared::remote::RemoteService;
use cache::ResponseCache;
use fetch::{FetchRequest, FetchResponse, Fetcher};
use registry::{SyncRegistry, BACKGROUND_SYNC_TAG};

const COMMAND_CAPACITY: usize = 64;
const OUTBOUND_CAPACITY: usize = 256;

/// Worker settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin the application shell is served from
    pub origin: String,
    pub shell_assets: Vec<String>,
    pub excluded_paths: Vec<String>,
    pub max_restarts: u32,
}

impl WorkerConfig {
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            origin: app.server_url.clone(),
            shell_assets: app.shell_assets.clone(),
            excluded_paths: app.excluded_paths.clone(),
            max_restarts: app.worker_max_restarts,
        }
    }
}

enum WorkerCommand {
    Message(BridgeMessage),
    Fetch {
        request: FetchRequest,
        reply: oneshot::Sender<SyncResult<FetchResponse>>,
    },
    RegisterSync {
        tag: String,
    },
    Shutdown,
}

/// State that outlives any single run of the command loop
struct WorkerShared {
    config: WorkerConfig,
    cache: ResponseCache,
    registry: SyncRegistry,
    fetcher: Arc<dyn Fetcher>,
    remote: Arc<dyn RemoteService>,
    network: Arc<NetworkMonitor>,
    outbound: broadcast::Sender<BridgeMessage>,
    restarts: AtomicU32,
    running: AtomicBool,
}

impl WorkerShared {
    fn broadcast(&self, message: BridgeMessage) -> usize {
        let kind = message.type_name();
        match self.outbound.send(message) {
            Ok(clients) => {
                debug!("[Worker] {} sent to {} clients", kind, clients);
                clients
            }
            Err(_) => {
                debug!("[Worker] {} dropped, no clients attached", kind);
                0
            }
        }
    }

    async fn handle(&self, command: WorkerCommand) {
        match command {
            WorkerCommand::Message(message) => self.handle_message(message).await,
            WorkerCommand::Fetch { request, reply } => {
                let result = self.cache.handle(self.fetcher.as_ref(), &request).await;
                let _ = reply.send(result);
            }
            WorkerCommand::RegisterSync { tag } => {
                if self.registry.register(&tag).await {
                    info!("[Worker] Registered sync tag {}", tag);
                }
                if self.network.is_online() {
                    self.fire_sync_tags().await;
                }
            }
            WorkerCommand::Shutdown => {}
        }
    }

    async fn handle_message(&self, message: BridgeMessage) {
        match message {
            BridgeMessage::RequestSync { .. } | BridgeMessage::SyncPendingPosts { .. } => {
                self.broadcast(BridgeMessage::GetPendingPosts {
                    source: "request-sync".to_string(),
                });
            }
            BridgeMessage::ProcessPendingPosts { posts } => self.process_handoff(posts).await,
            message @ BridgeMessage::PushSubscription { .. } => {
                self.broadcast(message);
            }
            other => debug!("[Worker] Ignoring client message {}", other.type_name()),
        }
    }

    /// Fire registered tags if some client can act on them
    async fn fire_sync_tags(&self) {
        if self.outbound.receiver_count() == 0 {
            debug!("[Worker] Online, but no clients attached; keeping sync tags");
            return;
        }
        for tag in self.registry.take_all().await {
            if tag == BACKGROUND_SYNC_TAG {
                info!("[Worker] Firing sync tag {}", tag);
                self.broadcast(BridgeMessage::GetPendingPosts {
                    source: "background-sync".to_string(),
                });
            } else {
                warn!("[Worker] Dropping unknown sync tag {}", tag);
            }
        }
    }

    /// Replay handed-off posts and report each outcome back to clients
    async fn process_handoff(&self, posts: Vec<QueuedOperation>) {
        let mut success_count = 0;
        let mut error_count = 0;

        for post in posts {
            if !matches!(post.payload, OperationPayload::Post(_)) {
                warn!("[Worker] Skipping non-post operation {} in hand-off", post.id);
                continue;
            }
            match self.remote.replay(&post).await {
                Ok(_) => {
                    success_count += 1;
                    self.broadcast(BridgeMessage::DeletePendingPost { post_id: post.id });
                }
                Err(e) => {
                    error_count += 1;
                    debug!("[Worker] Hand-off replay of {} failed: {}", post.id, e);
                    self.broadcast(BridgeMessage::UpdatePostAttempts {
                        post_id: post.id,
                        attempts: post.attempts.saturating_add(1),
                    });
                }
            }
        }

        info!(
            "[Worker] Hand-off finished: {} synced, {} failed",
            success_count, error_count
        );
        self.broadcast(BridgeMessage::SyncCompleted {
            success_count,
            error_count,
            total: success_count + error_count,
            timestamp: Utc::now(),
        });
    }
}

/// Command loop; returns on shutdown or when every handle is dropped
async fn run(shared: Arc<WorkerShared>, commands: Arc<Mutex<mpsc::Receiver<WorkerCommand>>>) {
    let mut commands = commands.lock().await;
    let mut status_rx = shared.network.subscribe();
    status_rx.borrow_and_update();
    let mut watching = true;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(WorkerCommand::Shutdown) | None => return,
                Some(command) => shared.handle(command).await,
            },
            changed = status_rx.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let online = status_rx.borrow_and_update().is_online();
                if online {
                    shared.fire_sync_tags().await;
                }
            }
        }
    }
}

async fn supervise(shared: Arc<WorkerShared>, commands: Arc<Mutex<mpsc::Receiver<WorkerCommand>>>) {
    shared.cache.precache(shared.fetcher.as_ref()).await;

    loop {
        let child = tokio::spawn(run(Arc::clone(&shared), Arc::clone(&commands)));
        match child.await {
            Ok(()) => {
                info!("[Worker] Stopped");
                break;
            }
            Err(e) if e.is_panic() => {
                let restarts = shared.restarts.fetch_add(1, Ordering::SeqCst) + 1;
                if restarts > shared.config.max_restarts {
                    error!("[Worker] Crashed {} times, giving up", restarts);
                    break;
                }
                warn!(
                    "[Worker] Crashed, restarting ({}/{})",
                    restarts, shared.config.max_restarts
                );
            }
            Err(_) => break,
        }
    }

    // close the command channel before reporting the worker as stopped
    drop(commands);
    shared.running.store(false, Ordering::SeqCst);
}

pub struct BackgroundWorker;

impl BackgroundWorker {
    /// Start the supervised worker; must be called inside a tokio runtime
    pub fn spawn(
        config: WorkerConfig,
        fetcher: Arc<dyn Fetcher>,
        remote: Arc<dyn RemoteService>,
        network: Arc<NetworkMonitor>,
    ) -> WorkerHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);

        let shared = Arc::new(WorkerShared {
            cache: ResponseCache::new(&config.origin, &config.shell_assets, &config.excluded_paths),
            registry: SyncRegistry::new(),
            config,
            fetcher,
            remote,
            network,
            outbound,
            restarts: AtomicU32::new(0),
            running: AtomicBool::new(true),
        });

        tokio::spawn(supervise(
            Arc::clone(&shared),
            Arc::new(Mutex::new(commands_rx)),
        ));

        WorkerHandle {
            commands: commands_tx,
            shared,
        }
    }
}

/// Cloneable client-side handle to the worker
#[derive(Clone)]
pub struct WorkerHandle {
    commands: mpsc::Sender<WorkerCommand>,
    shared: Arc<WorkerShared>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("running", &self.is_running())
            .field("restarts", &self.restarts())
            .finish()
    }
}

impl WorkerHandle {
    async fn send(&self, command: WorkerCommand) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::state("background worker is not running"))
    }

    /// Deliver a client message to the worker
    pub async fn post_message(&self, message: BridgeMessage) -> SyncResult<()> {
        self.send(WorkerCommand::Message(message)).await
    }

    /// Attach a client; the receiver sees every message the worker sends
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeMessage> {
        self.shared.outbound.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.shared.outbound.receiver_count()
    }

    /// Route a request through the worker's cache
    pub async fn fetch(&self, request: FetchRequest) -> SyncResult<FetchResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerCommand::Fetch { request, reply }).await?;
        rx.await
            .map_err(|_| SyncError::state("background worker dropped the request"))?
    }

    pub async fn register_sync(&self, tag: &str) -> SyncResult<()> {
        self.send(WorkerCommand::RegisterSync {
            tag: tag.to_string(),
        })
        .await
    }

    pub async fn registered_tags(&self) -> Vec<String> {
        self.shared.registry.tags().await
    }

    pub async fn cached_responses(&self) -> usize {
        self.shared.cache.len().await
    }

    pub fn restarts(&self) -> u32 {
        self.shared.restarts.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.send(WorkerCommand::Shutdown).await
    }
}
