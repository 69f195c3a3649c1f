//! # Response Cache
//!
//! Read-through cache for the background worker's fetch interception.
//!
//! A cached GET response is served without touching the network. On a miss
//! the request goes to the network and a successful (200) response is
//! stored in one of three buckets keyed by `METHOD url`. When the network
//! fails on a miss, a fallback for the request's destination is returned.

use futures_util::future::join_all;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::shared::error::SyncResult;
use crate::worker::fetch::{Destination, FetchRequest, FetchResponse, Fetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheBucket {
    /// Pre-cached application shell
    AppShell,
    /// Non-API pages and assets
    Dynamic,
    /// Images served under `/api/images`
    ApiImages,
}

impl CacheBucket {
    pub fn name(&self) -> &'static str {
        match self {
            CacheBucket::AppShell => "app_shell",
            CacheBucket::Dynamic => "dynamic",
            CacheBucket::ApiImages => "api_images",
        }
    }
}

#[derive(Debug)]
pub struct ResponseCache {
    origin: String,
    shell_urls: Vec<String>,
    excluded_paths: Vec<String>,
    buckets: RwLock<HashMap<CacheBucket, HashMap<String, FetchResponse>>>,
}

impl ResponseCache {
    pub fn new(origin: &str, shell_assets: &[String], excluded_paths: &[String]) -> Self {
        let origin = origin.trim_end_matches('/').to_string();
        let shell_urls = shell_assets
            .iter()
            .map(|asset| absolute_url(&origin, asset))
            .collect();
        Self {
            origin,
            shell_urls,
            excluded_paths: excluded_paths.to_vec(),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_excluded(&self, request: &FetchRequest) -> bool {
        let path = request.path();
        self.excluded_paths.iter().any(|p| path.contains(p.as_str()))
    }

    /// Bucket a successful response for `request` belongs in, if any
    pub fn bucket_for(&self, request: &FetchRequest) -> Option<CacheBucket> {
        if self.shell_urls.iter().any(|u| *u == request.url) {
            return Some(CacheBucket::AppShell);
        }
        let path = request.path();
        if path.starts_with("/api/images") {
            Some(CacheBucket::ApiImages)
        } else if !path.starts_with("/api/") {
            Some(CacheBucket::Dynamic)
        } else {
            None
        }
    }

    pub async fn get(&self, request: &FetchRequest) -> Option<FetchResponse> {
        let key = request.cache_key();
        let buckets = self.buckets.read().await;
        buckets.values().find_map(|entries| entries.get(&key).cloned())
    }

    pub async fn put(&self, bucket: CacheBucket, request: &FetchRequest, response: FetchResponse) {
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(bucket)
            .or_default()
            .insert(request.cache_key(), response);
    }

    pub async fn len(&self) -> usize {
        self.buckets.read().await.values().map(HashMap::len).sum()
    }

    pub async fn bucket_len(&self, bucket: CacheBucket) -> usize {
        self.buckets
            .read()
            .await
            .get(&bucket)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Cached root document of the origin
    pub async fn root_document(&self) -> Option<FetchResponse> {
        for path in ["/", "/index.html"] {
            let request = FetchRequest::get(absolute_url(&self.origin, path));
            if let Some(response) = self.get(&request).await {
                return Some(response);
            }
        }
        None
    }

    /// Fetch and store every application-shell asset; returns how many were cached
    pub async fn precache(&self, fetcher: &dyn Fetcher) -> usize {
        let requests: Vec<FetchRequest> = self
            .shell_urls
            .iter()
            .map(|url| FetchRequest::get(url.clone()))
            .collect();
        let responses = join_all(requests.iter().map(|request| fetcher.fetch(request))).await;

        let mut cached = 0;
        for (request, response) in requests.iter().zip(responses) {
            match response {
                Ok(response) if response.is_ok() => {
                    self.put(CacheBucket::AppShell, request, response).await;
                    cached += 1;
                }
                Ok(response) => warn!("[Cache] Shell asset {} returned {}", request.url, response.status),
                Err(e) => warn!("[Cache] Could not pre-cache {}: {}", request.url, e),
            }
        }
        info!("[Cache] Pre-cached {}/{} shell assets", cached, self.shell_urls.len());
        cached
    }

    /// Intercept one request
    pub async fn handle(
        &self,
        fetcher: &dyn Fetcher,
        request: &FetchRequest,
    ) -> SyncResult<FetchResponse> {
        if !request.is_get() || self.is_excluded(request) {
            return fetcher.fetch(request).await;
        }

        if let Some(cached) = self.get(request).await {
            debug!("[Cache] Hit {}", request.url);
            return Ok(cached);
        }

        match fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    if let Some(bucket) = self.bucket_for(request) {
                        self.put(bucket, request, response.clone()).await;
                    }
                }
                Ok(response)
            }
            Err(e) => {
                debug!("[Cache] Network failed for {}: {}", request.url, e);
                let fallback = match request.destination {
                    Destination::Document => self
                        .root_document()
                        .await
                        .unwrap_or_else(FetchResponse::offline),
                    Destination::Image => FetchResponse::image_placeholder(),
                    Destination::Other => FetchResponse::offline(),
                };
                Ok(fallback)
            }
        }
    }
}

fn absolute_url(origin: &str, asset: &str) -> String {
    if asset.starts_with("http://") || asset.starts_with("https://") {
        asset.to_string()
    } else if asset.starts_with('/') {
        format!("{}{}", origin, asset)
    } else {
        format!("{}/{}", origin, asset)
    }
}
