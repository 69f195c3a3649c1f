//! Foreground side: stores, queue manager, triggers, remote API and the
//! client end of the worker bridge

pub mod api;
pub mod bridge;
pub mod config;
pub mod local_db;
pub mod offline;
pub mod sync;

pub use api::ApiClient;
pub use bridge::BridgeClient;
pub use config::Config;
pub use offline::{ActionDispatcher, ActionOutcome, QueueManager};
pub use sync::{NetworkMonitor, NetworkStatus, SyncHandle, SyncService, SyncState};
