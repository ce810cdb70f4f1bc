//! Database test utilities
//!
//! Registry files live in a temporary directory so several pools can open the
//! same file, the way separate processes would.
//!
//! Note: Schema setup is done by the coordinator crate when it opens the
//! registry; pools from [`open_raw_pool`] see whatever is on disk.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A registry path inside a temporary directory, removed on drop
pub struct TempRegistry {
    _dir: TempDir,
    path: PathBuf,
}

impl TempRegistry {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("registry.db");
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Open a pool on an existing registry file without touching its schema
///
/// Lets tests inspect or corrupt the file behind the coordinator's back.
pub async fn open_raw_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
