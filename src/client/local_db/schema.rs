//! Database Schema Definitions
//!
//! Migrations are additive only. Each version lists the statements that take
//! a database from the previous version to this one.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i32] = &[1, 2];

const MIGRATION_1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sync_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS pending_posts (
        key INTEGER PRIMARY KEY AUTOINCREMENT,
        op_id TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        last_attempt_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_pending_posts_created_at ON pending_posts (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_pending_posts_status ON pending_posts (status)",
    "CREATE INDEX IF NOT EXISTS idx_pending_posts_attempts ON pending_posts (attempts)",
    "CREATE INDEX IF NOT EXISTS idx_pending_posts_endpoint
        ON pending_posts (json_extract(payload, '$.endpoint'))",
];

const MIGRATION_2: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS pending_auth_operations (
        key INTEGER PRIMARY KEY AUTOINCREMENT,
        op_id TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        last_attempt_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_pending_auth_created_at ON pending_auth_operations (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_pending_auth_kind ON pending_auth_operations (kind)",
    "CREATE INDEX IF NOT EXISTS idx_pending_auth_status ON pending_auth_operations (status)",
    "CREATE INDEX IF NOT EXISTS idx_pending_auth_attempts ON pending_auth_operations (attempts)",
    "CREATE INDEX IF NOT EXISTS idx_pending_auth_email
        ON pending_auth_operations (json_extract(payload, '$.email'))",
];

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}

/// Statements for one migration version
pub fn migration_statements(version: i32) -> &'static [&'static str] {
    match version {
        1 => MIGRATION_1,
        2 => MIGRATION_2,
        _ => &[],
    }
}
