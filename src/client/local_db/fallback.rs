//! # Blob Fallback Store
//!
//! Used when SQLite cannot be opened. Each collection is one JSON document in
//! `<dir>/<collection>.json` holding the records and the next key to hand
//! out; every operation is a read-modify-write of the whole blob. Keys are
//! never reused, even after the highest record is deleted or the collection
//! is cleared. Writes within a process are serialized by a mutex. Two
//! processes writing the same directory can still lose updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::local_db::store::OperationStore;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::operation::{Collection, QueuedOperation};

const SIDECAR_FILE: &str = "sync_metadata.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Blob {
    next_key: i64,
    records: Vec<serde_json::Value>,
}

/// Decoded contents of one collection blob
#[derive(Debug)]
struct Contents {
    next_key: i64,
    records: Vec<QueuedOperation>,
}

impl Contents {
    fn insert(&mut self, record: &QueuedOperation) -> SyncResult<i64> {
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(SyncError::storage(format!(
                "operation {} already exists",
                record.id
            )));
        }
        let key = self.next_key;
        self.next_key += 1;
        let mut stored = record.clone();
        stored.key = Some(key);
        self.records.push(stored);
        Ok(key)
    }
}

/// JSON-file backed operation store
#[derive(Debug)]
pub struct BlobStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.as_str()))
    }

    async fn read_bytes(path: &Path) -> SyncResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_bytes(&self, path: &Path, bytes: Vec<u8>) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn load(&self, collection: Collection) -> SyncResult<Contents> {
        let Some(bytes) = Self::read_bytes(&self.blob_path(collection)).await? else {
            return Ok(Contents {
                next_key: 1,
                records: Vec::new(),
            });
        };

        let blob: Blob = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::storage(format!("corrupt blob {}: {}", collection, e)))?;

        let mut records = Vec::with_capacity(blob.records.len());
        for value in blob.records {
            match serde_json::from_value::<QueuedOperation>(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!("[BlobStore] Skipping malformed record in {}: {}", collection, e),
            }
        }
        records.sort_by_key(|r| r.key);

        // A hand-edited counter must not fall behind the stored keys
        let highest = records.iter().filter_map(|r| r.key).max().unwrap_or(0);
        Ok(Contents {
            next_key: blob.next_key.max(highest + 1).max(1),
            records,
        })
    }

    async fn save(&self, collection: Collection, contents: &Contents) -> SyncResult<()> {
        let blob = Blob {
            next_key: contents.next_key,
            records: contents
                .records
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()?,
        };
        let bytes = serde_json::to_vec(&blob)?;
        self.write_bytes(&self.blob_path(collection), bytes).await?;
        debug!(
            "[BlobStore] Wrote {} records to {}",
            contents.records.len(),
            collection
        );
        Ok(())
    }
}

#[async_trait]
impl OperationStore for BlobStore {
    fn name(&self) -> &'static str {
        "blob"
    }

    async fn add(&self, collection: Collection, record: &QueuedOperation) -> SyncResult<i64> {
        let _guard = self.write_lock.lock().await;
        let mut contents = self.load(collection).await?;
        let key = contents.insert(record)?;
        self.save(collection, &contents).await?;
        Ok(key)
    }

    async fn get_all(&self, collection: Collection) -> SyncResult<Vec<QueuedOperation>> {
        Ok(self.load(collection).await?.records)
    }

    async fn update(&self, collection: Collection, record: &QueuedOperation) -> SyncResult<i64> {
        let _guard = self.write_lock.lock().await;
        let mut contents = self.load(collection).await?;

        let key = match record.key {
            None => contents.insert(record)?,
            Some(key) => {
                contents
                    .records
                    .retain(|r| r.key != Some(key) && r.id != record.id);
                contents.records.push(record.clone());
                contents.records.sort_by_key(|r| r.key);
                contents.next_key = contents.next_key.max(key + 1);
                key
            }
        };

        self.save(collection, &contents).await?;
        Ok(key)
    }

    async fn delete(&self, collection: Collection, key: i64) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut contents = self.load(collection).await?;
        let before = contents.records.len();
        contents.records.retain(|r| r.key != Some(key));
        if contents.records.len() != before {
            self.save(collection, &contents).await?;
        }
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut contents = self.load(collection).await?;
        contents.records.clear();
        self.save(collection, &contents).await
    }

    async fn record_sync(&self, at: DateTime<Utc>) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let sidecar = Sidecar { last_sync: Some(at) };
        let bytes = serde_json::to_vec(&sidecar)?;
        self.write_bytes(&self.dir.join(SIDECAR_FILE), bytes).await
    }

    async fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let Some(bytes) = Self::read_bytes(&self.dir.join(SIDECAR_FILE)).await? else {
            return Ok(None);
        };
        let sidecar: Sidecar = serde_json::from_slice(&bytes)?;
        Ok(sidecar.last_sync)
    }
}
