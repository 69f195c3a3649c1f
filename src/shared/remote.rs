//! Remote service contract
//!
//! The queue only needs to know that the remote API accepts a request and
//! answers with success or a status code. `RemoteService` is that seam; the
//! reqwest-backed [`ApiClient`](crate::client::api::ApiClient) is the
//! production implementation and tests substitute their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::SyncResult;
use crate::shared::operation::{
    LoginPayload, OperationPayload, PostPayload, QueuedOperation, RegisterPayload,
};

/// User information returned by the auth endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// Authentication response from server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

/// Body of `POST /api/auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body of `POST /api/auth/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Body of `POST /api/posts`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub author: &'a str,
    pub author_id: Option<&'a str>,
    pub timestamp: DateTime<Utc>,
}

impl<'a> From<&'a PostPayload> for CreatePostRequest<'a> {
    fn from(post: &'a PostPayload) -> Self {
        Self {
            title: &post.title,
            content: &post.content,
            author: &post.author,
            author_id: post.author_id.as_deref(),
            timestamp: post.timestamp,
        }
    }
}

/// What a successful replay returned
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayResponse {
    Auth(AuthResponse),
    Post(serde_json::Value),
}

#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn login(&self, login: &LoginPayload) -> SyncResult<AuthResponse>;

    async fn register(&self, register: &RegisterPayload) -> SyncResult<AuthResponse>;

    async fn create_post(&self, post: &PostPayload) -> SyncResult<serde_json::Value>;

    /// `GET {base}/api/health`; any non-2xx is an error
    async fn health(&self) -> SyncResult<()>;

    /// Install the session token used for authenticated calls
    fn set_token(&self, _token: Option<String>) {}

    /// Replay a queued operation against the matching endpoint
    async fn replay(&self, operation: &QueuedOperation) -> SyncResult<ReplayResponse> {
        match &operation.payload {
            OperationPayload::Post(post) => self.create_post(post).await.map(ReplayResponse::Post),
            OperationPayload::Login(login) => self.login(login).await.map(ReplayResponse::Auth),
            OperationPayload::Register(register) => {
                self.register(register).await.map(ReplayResponse::Auth)
            }
        }
    }
}
