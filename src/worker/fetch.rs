//! Network-equivalent requests intercepted by the background worker

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, Url};

use crate::shared::error::{SyncError, SyncResult};

/// What the requester intends to do with the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Image,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub destination: Destination,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            destination: Destination::Other,
        }
    }

    pub fn document(url: impl Into<String>) -> Self {
        Self {
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            destination: Destination::Image,
            ..Self::get(url)
        }
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Path component of the URL, or the raw URL if it does not parse
    pub fn path(&self) -> String {
        Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.url.clone())
    }

    /// `METHOD url` cache key
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    /// Empty SVG placeholder served for images while offline
    pub fn image_placeholder() -> Self {
        Self::new(200, Some("image/svg+xml"), Bytes::new())
    }

    /// 503 text payload served when nothing else is available
    pub fn offline() -> Self {
        Self::new(503, Some("text/plain"), Bytes::from_static("Offline".as_bytes()))
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse>;
}

/// reqwest-backed fetcher
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse> {
        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| SyncError::validation("method", format!("invalid method {}", request.method)))?;
        let response = self
            .client
            .request(method, &request.url)
            .send()
            .await
            .map_err(|e| SyncError::network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::network(e.to_string()))?;

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}
