//! offline-relay - Offline-first operation queue
//!
//! Lets a client application log in, register and create posts while the
//! remote service is unreachable. Actions are persisted on the device and
//! replayed once connectivity returns.
//!
//! # Module Structure
//!
//! - **`shared`** - Types used on both sides of the worker bridge
//!   - Queued operation model, bridge messages, queue events
//!   - Remote service contract, errors, configuration
//!
//! - **`client`** - Foreground side
//!   - SQLite store with a JSON blob fallback
//!   - Queue manager, drain guards, retry policy
//!   - Network monitor and the sync service that triggers drains
//!   - reqwest API client and the action dispatcher
//!   - Bridge client applying worker messages to the queue
//!
//! - **`worker`** - Supervised background worker
//!   - Read-through response cache
//!   - Deferred-sync tag registry
//!   - `{type, data}` message handling
//!
//! # Feature Flags
//!
//! - **`daemon`** - builds the `offline-relay` binary with `tracing-subscriber`
//!   and `.env` loading
//!
//! # Usage
//!
//! ```rust,no_run
//! use offline_relay::client::{ActionDispatcher, ApiClient, Config, NetworkMonitor, QueueManager};
//! use offline_relay::shared::PostPayload;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let remote = Arc::new(ApiClient::new(config.clone())?);
//! let network = Arc::new(NetworkMonitor::default());
//! let queue = Arc::new(QueueManager::open(config.app(), remote, network).await);
//!
//! let actions = ActionDispatcher::new(queue);
//! let post = PostPayload::new("Hello", "Written on a plane", "alice", config.server_url());
//! let outcome = actions.create_post(post).await?;
//! println!("queued: {}", outcome.is_queued());
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Components are shared through `Arc`. The foreground and the worker talk
//! only through channels: `mpsc` into the worker, `broadcast` out of it.

/// Shared types and data structures
pub mod shared;

/// Foreground client
pub mod client;

/// Background worker
pub mod worker;
