//! # Local Database Module
//!
//! Durable storage for queued operations. The primary backend is SQLite via
//! sqlx; when it cannot be opened the queue manager falls back to
//! [`BlobStore`](fallback::BlobStore), a JSON file per collection.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, migrations and sync metadata
//! - `DatabaseHandle`: opens the database once and shares it
//! - `schema.rs`: versioned, additive migrations
//! - `store.rs`: the `OperationStore` trait and its SQLite implementation
//! - `fallback.rs`: the JSON blob fallback store
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_relay::client::local_db::{LocalDatabase, OperationStore};
//! use offline_relay::shared::{Collection, OperationPayload, PostPayload, QueuedOperation};
//!
//! # async fn demo() -> offline_relay::shared::SyncResult<()> {
//! let db = LocalDatabase::open("/tmp/offline-relay/queue.db").await?;
//! let post = PostPayload::new("Title", "Body", "alice", "http://127.0.0.1:3000");
//! let op = QueuedOperation::new(OperationPayload::Post(post));
//! let key = db.add(Collection::PendingPosts, &op).await?;
//! # let _ = key;
//! # Ok(())
//! # }
//! ```

pub mod fallback;
pub mod schema;
pub mod store;

pub use fallback::BlobStore;
pub use store::OperationStore;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::shared::error::{SyncError, SyncResult};
use schema::{get_pending_migrations, migration_statements, CURRENT_SCHEMA_VERSION};

/// Local database connection manager
#[derive(Debug)]
pub struct LocalDatabase {
    pool: SqlitePool,
    path: PathBuf,
}

impl LocalDatabase {
    /// Open or create the database at `path` and bring it to the current schema
    pub async fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        Self::open_up_to(path, CURRENT_SCHEMA_VERSION).await
    }

    /// Open or create the database, applying migrations only up to `target_version`
    pub async fn open_up_to(path: impl AsRef<Path>, target_version: i32) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::storage_unavailable(format!("{}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| SyncError::storage_unavailable(e.to_string()))?;

        let db = Self { pool, path };
        db.run_migrations(target_version)
            .await
            .map_err(|e| SyncError::storage_unavailable(e.to_string()))?;

        debug!("[LocalDb] Opened {}", db.path.display());
        Ok(db)
    }

    /// Run database migrations
    ///
    /// Checks the current schema version and applies any missing migrations,
    /// each inside its own transaction.
    async fn run_migrations(&self, target_version: i32) -> SyncResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current = self.schema_version().await?;
        if current > CURRENT_SCHEMA_VERSION {
            return Err(SyncError::storage_unavailable(format!(
                "database schema v{} is newer than supported v{}",
                current, CURRENT_SCHEMA_VERSION
            )));
        }

        for version in get_pending_migrations(current)
            .into_iter()
            .filter(|v| *v <= target_version)
        {
            self.apply_migration(version).await?;
        }

        Ok(())
    }

    async fn apply_migration(&self, version: i32) -> SyncResult<()> {
        let mut tx = self.pool.begin().await?;

        for statement in migration_statements(version) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("[LocalDb] Applied schema migration v{}", version);
        Ok(())
    }

    /// Highest applied migration version
    pub async fn schema_version(&self) -> SyncResult<i32> {
        let (version,): (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> SyncResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> SyncResult<Option<String>> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM sync_metadata WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.map(|(v,)| v))
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Opens the database once and hands out shared references
///
/// Concurrent callers wait on the in-flight open. A failed open leaves the
/// handle empty so the next call tries again.
#[derive(Debug)]
pub struct DatabaseHandle {
    path: PathBuf,
    cell: OnceCell<Arc<LocalDatabase>>,
}

impl DatabaseHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cell: OnceCell::new(),
        }
    }

    /// Return the open database, opening it on first use
    pub async fn get(&self) -> SyncResult<Arc<LocalDatabase>> {
        let db = self
            .cell
            .get_or_try_init(|| async {
                match LocalDatabase::open(&self.path).await {
                    Ok(db) => Ok(Arc::new(db)),
                    Err(e) => {
                        warn!("[LocalDb] Failed to open {}: {}", self.path.display(), e);
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(Arc::clone(db))
    }

    pub fn is_open(&self) -> bool {
        self.cell.initialized()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
