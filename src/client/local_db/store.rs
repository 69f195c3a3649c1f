//! # Operation Store
//!
//! The `OperationStore` trait is the durable-store seam used by the queue
//! manager. [`LocalDatabase`] implements it over SQLite; the JSON
//! [`BlobStore`](super::fallback::BlobStore) implements it as a fallback.
//!
//! Rows that fail to decode are skipped with a warning rather than failing
//! the whole read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use crate::client::local_db::LocalDatabase;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::operation::{Collection, OperationPayload, QueuedOperation};

/// Metadata key holding the last successful drain time
pub const LAST_SYNC_KEY: &str = "last_sync";

#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Short backend name used in logs and health reports
    fn name(&self) -> &'static str;

    /// Insert a new record and return its key
    async fn add(&self, collection: Collection, record: &QueuedOperation) -> SyncResult<i64>;

    /// All records in ascending key order
    async fn get_all(&self, collection: Collection) -> SyncResult<Vec<QueuedOperation>>;

    /// Full-record replace keyed by `record.key`; inserts when the key is absent
    async fn update(&self, collection: Collection, record: &QueuedOperation) -> SyncResult<i64>;

    /// Remove one record; absent keys are ignored
    async fn delete(&self, collection: Collection, key: i64) -> SyncResult<()>;

    /// Remove every record
    async fn clear(&self, collection: Collection) -> SyncResult<()>;

    /// Persist the time of the last completed drain
    async fn record_sync(&self, at: DateTime<Utc>) -> SyncResult<()>;

    async fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>>;

    /// Applied schema version, if the backend is versioned
    async fn schema_version(&self) -> SyncResult<Option<i32>> {
        Ok(None)
    }
}

fn decode_row(row: &SqliteRow) -> SyncResult<QueuedOperation> {
    let payload: String = row.try_get("payload")?;
    let payload: OperationPayload = serde_json::from_str(&payload)?;
    let status: String = row.try_get("status")?;
    let attempts: i64 = row.try_get("attempts")?;
    let created_at: String = row.try_get("created_at")?;
    let last_attempt_at: Option<String> = row.try_get("last_attempt_at")?;

    Ok(QueuedOperation {
        key: Some(row.try_get("key")?),
        id: row.try_get("op_id")?,
        payload,
        status: status.parse()?,
        attempts: u32::try_from(attempts)
            .map_err(|_| SyncError::serialization(format!("invalid attempts: {}", attempts)))?,
        created_at: parse_timestamp(&created_at)?,
        last_attempt_at: last_attempt_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn parse_timestamp(raw: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::serialization(format!("invalid timestamp {}: {}", raw, e)))
}

#[async_trait]
impl OperationStore for LocalDatabase {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn add(&self, collection: Collection, record: &QueuedOperation) -> SyncResult<i64> {
        let payload = serde_json::to_string(&record.payload)?;
        let sql = format!(
            "INSERT INTO {} (op_id, kind, payload, status, attempts, created_at, last_attempt_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            collection.as_str()
        );

        let result = sqlx::query(&sql)
            .bind(&record.id)
            .bind(record.kind().as_str())
            .bind(&payload)
            .bind(record.status.as_str())
            .bind(i64::from(record.attempts))
            .bind(record.created_at.to_rfc3339())
            .bind(record.last_attempt_at.map(|t| t.to_rfc3339()))
            .execute(self.pool())
            .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_all(&self, collection: Collection) -> SyncResult<Vec<QueuedOperation>> {
        let sql = format!(
            "SELECT key, op_id, kind, payload, status, attempts, created_at, last_attempt_at
             FROM {} ORDER BY key ASC",
            collection.as_str()
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;

        let mut operations = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row(&row) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    let key: Option<i64> = row.try_get("key").ok();
                    warn!("[LocalDb] Skipping malformed row {:?} in {}: {}", key, collection, e);
                }
            }
        }

        Ok(operations)
    }

    async fn update(&self, collection: Collection, record: &QueuedOperation) -> SyncResult<i64> {
        let Some(key) = record.key else {
            return self.add(collection, record).await;
        };

        let payload = serde_json::to_string(&record.payload)?;
        let sql = format!(
            "INSERT OR REPLACE INTO {}
                (key, op_id, kind, payload, status, attempts, created_at, last_attempt_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            collection.as_str()
        );

        sqlx::query(&sql)
            .bind(key)
            .bind(&record.id)
            .bind(record.kind().as_str())
            .bind(&payload)
            .bind(record.status.as_str())
            .bind(i64::from(record.attempts))
            .bind(record.created_at.to_rfc3339())
            .bind(record.last_attempt_at.map(|t| t.to_rfc3339()))
            .execute(self.pool())
            .await?;

        Ok(key)
    }

    async fn delete(&self, collection: Collection, key: i64) -> SyncResult<()> {
        let sql = format!("DELETE FROM {} WHERE key = ?", collection.as_str());
        sqlx::query(&sql).bind(key).execute(self.pool()).await?;
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> SyncResult<()> {
        let sql = format!("DELETE FROM {}", collection.as_str());
        sqlx::query(&sql).execute(self.pool()).await?;
        Ok(())
    }

    async fn record_sync(&self, at: DateTime<Utc>) -> SyncResult<()> {
        self.set_sync_metadata(LAST_SYNC_KEY, &at.to_rfc3339()).await
    }

    async fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>> {
        self.get_sync_metadata(LAST_SYNC_KEY)
            .await?
            .as_deref()
            .map(parse_timestamp)
            .transpose()
    }

    async fn schema_version(&self) -> SyncResult<Option<i32>> {
        LocalDatabase::schema_version(self).await.map(Some)
    }
}
