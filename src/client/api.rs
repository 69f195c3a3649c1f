/**
 * Remote API Client
 *
 * reqwest implementation of `RemoteService`. Each queued payload carries its
 * own base URL, so replays go to the server that was current when the action
 * was captured. Authenticated calls send `Authorization: Bearer <token>`,
 * preferring the token stored on the payload over the session token.
 */
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::Serialize;
use std::sync::RwLock;
use tracing::debug;

use crate::client::config::{build_url, Config};
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::operation::{LoginPayload, PostPayload, RegisterPayload};
use crate::shared::remote::{
    AuthResponse, CreatePostRequest, LoginRequest, RegisterRequest, RemoteService,
};

#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    config: Config,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(config: Config) -> SyncResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SyncError::config(format!("failed to build HTTP client: {}", e)))?;
        let token = RwLock::new(config.get_token().map(str::to_string));
        Ok(Self {
            client,
            config,
            token,
        })
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &B,
        token: Option<String>,
    ) -> SyncResult<Response> {
        debug!("[Api] {} {}", method, url);
        let mut request = self.client.request(method, url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::network(format!("Network error: {}", e)))?;
        check_status(response).await
    }
}

/// Turn a non-2xx response into `RemoteRejected` with the server's message
async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("Error {}", status));
    Err(SyncError::rejected(status.as_u16(), message))
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> SyncResult<T> {
    response
        .json()
        .await
        .map_err(|e| SyncError::serialization(format!("Failed to parse response: {}", e)))
}

#[async_trait]
impl RemoteService for ApiClient {
    async fn login(&self, login: &LoginPayload) -> SyncResult<AuthResponse> {
        let url = build_url(&login.base_url, "/auth/login");
        let body = LoginRequest {
            email: &login.email,
            password: &login.password,
        };
        let response = self.send_json(Method::POST, &url, &body, None).await?;
        parse_json(response).await
    }

    async fn register(&self, register: &RegisterPayload) -> SyncResult<AuthResponse> {
        let url = build_url(&register.base_url, "/auth/register");
        let body = RegisterRequest {
            username: &register.username,
            email: &register.email,
            password: &register.password,
        };
        let response = self.send_json(Method::POST, &url, &body, None).await?;
        parse_json(response).await
    }

    async fn create_post(&self, post: &PostPayload) -> SyncResult<serde_json::Value> {
        let url = build_url(&post.base_url, &post.endpoint);
        let method = Method::from_bytes(post.method.to_uppercase().as_bytes())
            .map_err(|_| SyncError::validation("method", format!("invalid method {}", post.method)))?;
        let token = post.token.clone().or_else(|| self.token());

        let response = self
            .send_json(method, &url, &CreatePostRequest::from(post), token)
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::network(format!("Network error: {}", e)))?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn health(&self) -> SyncResult<()> {
        let url = self.config.api_url("/health");
        let response = self
            .client
            .get(&url)
            .timeout(self.config.app().health_timeout)
            .send()
            .await
            .map_err(|e| SyncError::network(format!("Network error: {}", e)))?;
        check_status(response).await.map(|_| ())
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }
}
