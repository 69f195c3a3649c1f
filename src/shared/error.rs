//! Shared Error Types
//!
//! This module defines the error taxonomy used by every layer of the relay:
//! the durable store, the queue manager, the remote client and the background
//! worker.
//!
//! # Error Categories
//!
//! - `StorageUnavailable` - the persistence engine cannot be opened
//! - `StorageFailure` - a read or write failed after the store was opened
//! - `NetworkFailure` - transport error talking to the remote service
//! - `RemoteRejected` - the remote service answered with a non-2xx status
//! - `ValidationFailure` - malformed local input, never queued
//!
//! # Usage
//!
//! ```rust
//! use offline_relay::shared::error::SyncError;
//!
//! let error = SyncError::validation("title", "Post title cannot be empty");
//! assert!(!error.is_retryable());
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be safely shared across task boundaries.
use thiserror::Error;

/// Result alias used across the crate
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the offline queue and its collaborators
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The persistence engine could not be opened (schema mismatch, quota,
    /// missing directory). Callers fall back to the blob store.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Human-readable error message
        message: String,
    },

    /// A read or write against an opened store failed
    #[error("Storage failure: {message}")]
    StorageFailure {
        /// Human-readable error message
        message: String,
    },

    /// Transport-level failure reaching the remote service
    #[error("Network failure: {message}")]
    NetworkFailure {
        /// Human-readable error message
        message: String,
    },

    /// The remote service answered with a non-2xx status
    #[error("Remote rejected request with status {status}: {message}")]
    RemoteRejected {
        /// HTTP status code returned by the remote service
        status: u16,
        /// Error message extracted from the response body
        message: String,
    },

    /// Local input failed validation
    #[error("Validation error in field '{field}': {message}")]
    ValidationFailure {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable error message
        message: String,
    },

    /// Service lifecycle misuse (starting twice, worker gone)
    #[error("State error: {message}")]
    State {
        /// Human-readable error message
        message: String,
    },
}

impl SyncError {
    /// Create a new storage-unavailable error
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Create a new storage failure
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageFailure {
            message: message.into(),
        }
    }

    /// Create a new network failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            message: message.into(),
        }
    }

    /// Create a new remote rejection
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status,
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailure {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Whether a queued operation that hit this error should stay in the queue.
    ///
    /// 4xx and 5xx responses are treated the same as transport errors.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure { .. } | Self::RemoteRejected { .. }
        )
    }

    /// Whether this error comes from the durable store
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::StorageFailure { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(format!("I/O error: {}", err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::rejected(status.as_u16(), err.to_string()),
            None => Self::network(err.to_string()),
        }
    }
}
