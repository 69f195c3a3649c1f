//! Shared Module
//!
//! Types shared by the foreground client and the background worker: the
//! queued operation model, the bridge message protocol, queue events, the
//! remote service contract, errors and configuration.
//!
//! # Overview
//!
//! Nothing in this module performs I/O on its own. Everything here is
//! serializable and cheap to clone so it can cross task boundaries through
//! channels.

/// Queued operation model
pub mod operation;

/// Bridge message protocol
pub mod message;

/// Queue event system
pub mod event;

/// Shared error types
pub mod error;

/// Remote service contract
pub mod remote;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::{SyncError, SyncResult};
pub use event::{DrainSummary, QueueEvent};
pub use message::{BridgeMessage, PushAction};
pub use operation::{
    Collection, LoginPayload, OperationKind, OperationPayload, OperationStatus, PostPayload,
    QueuedOperation, RegisterPayload,
};
pub use remote::{AuthResponse, RemoteService, ReplayResponse, UserInfo};
