//! Deferred-sync tag registry
//!
//! A tag is registered when work is deferred and stays registered until it is
//! fired at a moment when some client can act on it.

use std::collections::BTreeSet;
use tokio::sync::RwLock;

/// Tag registered when a post is queued offline
pub const BACKGROUND_SYNC_TAG: &str = "pending-posts-sync";

#[derive(Debug, Default)]
pub struct SyncRegistry {
    tags: RwLock<BTreeSet<String>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the tag was already registered
    pub async fn register(&self, tag: &str) -> bool {
        self.tags.write().await.insert(tag.to_string())
    }

    pub async fn is_registered(&self, tag: &str) -> bool {
        self.tags.read().await.contains(tag)
    }

    pub async fn tags(&self) -> Vec<String> {
        self.tags.read().await.iter().cloned().collect()
    }

    /// Remove and return every registered tag
    pub async fn take_all(&self) -> Vec<String> {
        std::mem::take(&mut *self.tags.write().await)
            .into_iter()
            .collect()
    }
}
