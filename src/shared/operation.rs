/**
 * Queued Operation Model
 *
 * A QueuedOperation is a user action captured while the remote service was
 * unreachable, together with the lifecycle metadata needed to replay it.
 * Operations live in one of two collections: posts and auth actions.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::shared::error::SyncError;

/// Store collection an operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    PendingPosts,
    #[serde(rename = "pending_auth_operations")]
    PendingAuth,
}

impl Collection {
    /// All collections, in the order a reconnect drains them
    pub const ALL: [Collection; 2] = [Collection::PendingAuth, Collection::PendingPosts];

    /// Table / blob name
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::PendingPosts => "pending_posts",
            Collection::PendingAuth => "pending_auth_operations",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of replayable action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "content-post")]
    ContentPost,
    #[serde(rename = "auth-login")]
    AuthLogin,
    #[serde(rename = "auth-register")]
    AuthRegister,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ContentPost => "content-post",
            OperationKind::AuthLogin => "auth-login",
            OperationKind::AuthRegister => "auth-register",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            OperationKind::ContentPost => Collection::PendingPosts,
            OperationKind::AuthLogin | OperationKind::AuthRegister => Collection::PendingAuth,
        }
    }
}

impl FromStr for OperationKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content-post" => Ok(OperationKind::ContentPost),
            "auth-login" => Ok(OperationKind::AuthLogin),
            "auth-register" => Ok(OperationKind::AuthRegister),
            other => Err(SyncError::serialization(format!(
                "unknown operation kind: {}",
                other
            ))),
        }
    }
}

/// Lifecycle status of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting to be replayed
    Pending,
    /// Replayed successfully; deleted right after
    Completed,
    /// Exhausted its attempts
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }
}

impl FromStr for OperationStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            other => Err(SyncError::serialization(format!(
                "unknown operation status: {}",
                other
            ))),
        }
    }
}

/// A content post waiting to be published
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    pub title: String,
    pub content: String,
    pub author: String,
    pub author_id: Option<String>,
    /// Target path, e.g. `/api/posts`
    pub endpoint: String,
    pub method: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Client-side creation time
    pub timestamp: DateTime<Utc>,
}

impl PostPayload {
    /// A `POST /api/posts` payload stamped with the current time
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author: author.into(),
            author_id: None,
            endpoint: "/api/posts".to_string(),
            method: "POST".to_string(),
            base_url: base_url.into(),
            token: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_author_id(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Credentials for a deferred login
///
/// The password is persisted in clear text inside the local queue, as the
/// device store is the only place the action can wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
    pub base_url: String,
}

impl LoginPayload {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            base_url: base_url.into(),
        }
    }
}

/// Details for a deferred registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
    pub base_url: String,
}

impl RegisterPayload {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            base_url: base_url.into(),
        }
    }
}

/// Replay data, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationPayload {
    Post(PostPayload),
    Login(LoginPayload),
    Register(RegisterPayload),
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationPayload::Post(_) => OperationKind::ContentPost,
            OperationPayload::Login(_) => OperationKind::AuthLogin,
            OperationPayload::Register(_) => OperationKind::AuthRegister,
        }
    }

    pub fn collection(&self) -> Collection {
        self.kind().collection()
    }

    /// Email correlation field for auth operations
    pub fn email(&self) -> Option<&str> {
        match self {
            OperationPayload::Login(login) => Some(&login.email),
            OperationPayload::Register(register) => Some(&register.email),
            OperationPayload::Post(_) => None,
        }
    }

    /// Reject payloads that can never succeed
    pub fn validate(&self) -> Result<(), SyncError> {
        match self {
            OperationPayload::Post(post) => {
                require("title", &post.title)?;
                require("content", &post.content)?;
                require("endpoint", &post.endpoint)?;
                require("base_url", &post.base_url)?;
            }
            OperationPayload::Login(login) => {
                require_email(&login.email)?;
                require("password", &login.password)?;
                require("base_url", &login.base_url)?;
            }
            OperationPayload::Register(register) => {
                require("username", &register.username)?;
                require_email(&register.email)?;
                require("password", &register.password)?;
                require("base_url", &register.base_url)?;
            }
        }
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        return Err(SyncError::validation(field, format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn require_email(email: &str) -> Result<(), SyncError> {
    require("email", email)?;
    if !email.contains('@') {
        return Err(SyncError::validation("email", "Invalid email format"));
    }
    Ok(())
}

/// An operation waiting in the durable store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    /// Store-assigned key, absent until first insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<i64>,
    /// Correlation id, unique within a collection
    pub id: String,
    pub payload: OperationPayload,
    pub status: OperationStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedOperation {
    /// A fresh pending operation with a generated id
    pub fn new(payload: OperationPayload) -> Self {
        Self {
            key: None,
            id: generate_operation_id(),
            payload,
            status: OperationStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    pub fn collection(&self) -> Collection {
        self.payload.collection()
    }

    pub fn is_pending(&self) -> bool {
        self.status == OperationStatus::Pending
    }

    /// Count a failed replay; flips to `Failed` once `max_attempts` is reached
    pub fn record_failure(&mut self, now: DateTime<Utc>, max_attempts: u32) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = Some(now);
        if self.attempts >= max_attempts {
            self.status = OperationStatus::Failed;
        }
    }

    /// Apply an absolute attempt count reported from elsewhere. Never lowers
    /// the stored count. Returns whether anything changed.
    pub fn apply_attempts(&mut self, attempts: u32, now: DateTime<Utc>, max_attempts: u32) -> bool {
        if attempts <= self.attempts {
            return false;
        }
        self.attempts = attempts;
        self.last_attempt_at = Some(now);
        if self.attempts >= max_attempts {
            self.status = OperationStatus::Failed;
        }
        true
    }

    /// Manual reset back to a fresh pending state
    pub fn reset(&mut self) {
        self.status = OperationStatus::Pending;
        self.attempts = 0;
    }
}

/// Millisecond timestamp followed by a 9-character random suffix
pub fn generate_operation_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", millis, &random[..9])
}
