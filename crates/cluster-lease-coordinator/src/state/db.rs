//! Database setup and schema management
//!
//! The registry lives in a single SQLite file that every cooperating process
//! opens. SQLite's file lock is the only cross-process lock: each registry
//! primitive is one SQL statement, so no transaction ever spans an await on a
//! provider call.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Database connection pool type alias
pub type DbPool = SqlitePool;

/// Columns the current `leases` table must have
const LEASE_COLUMNS: &[&str] = &[
    "fingerprint",
    "status",
    "resource_id",
    "owner_id",
    "owner_released",
    "usage_count",
    "created_at",
    "expiry_time",
    "error_message",
];

/// Default registry location under the platform data directory
pub fn default_db_path() -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("", "", "cluster-lease").context("Failed to get project directories")?;

    Ok(proj_dirs.data_local_dir().join("registry.db"))
}

/// Open the registry database, creating it and its schema if needed
pub async fn open_db(path: &Path, busy_timeout: Duration) -> Result<DbPool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create registry directory {}", parent.display()))?;
    }

    // Rollback journal rather than WAL: WAL needs shared memory, which
    // network filesystems do not provide.
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .busy_timeout(busy_timeout)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open registry database {}", path.display()))?;

    setup_schema(&pool).await?;
    debug!(path = %path.display(), "Opened lease registry");

    Ok(pool)
}

/// Setup database schema
pub(crate) async fn setup_schema(pool: &DbPool) -> Result<()> {
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('leases')")
        .fetch_all(pool)
        .await
        .context("Failed to inspect registry schema")?;

    let outdated = !columns.is_empty()
        && LEASE_COLUMNS
            .iter()
            .any(|c| !columns.iter().any(|existing| existing == c));

    if outdated {
        warn!("Old registry schema detected - dropping and recreating tables");
        sqlx::query("DROP TABLE IF EXISTS leases")
            .execute(pool)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS cluster_cache")
            .execute(pool)
            .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leases (
            fingerprint TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            resource_id TEXT,
            owner_id TEXT NOT NULL,
            owner_released INTEGER NOT NULL DEFAULT 0,
            usage_count INTEGER NOT NULL DEFAULT 0 CHECK (usage_count >= 0),
            created_at TEXT NOT NULL,
            expiry_time TEXT NOT NULL,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cluster_cache (
            slot INTEGER PRIMARY KEY CHECK (slot = 0),
            resource_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expiry_time TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_leases_status ON leases(status)")
        .execute(pool)
        .await?;

    Ok(())
}

/// In-memory registry with schema, for unit tests
#[cfg(test)]
pub(crate) async fn open_test_db() -> Result<DbPool> {
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    setup_schema(&pool).await?;
    Ok(pool)
}
