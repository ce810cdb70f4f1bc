//! Single-slot cache of a private cluster
//!
//! Lets a process that does not share clusters reuse the one it made last
//! time. Reads never modify the slot; removing an expired entry is the job of
//! the sweep. The slot does not coordinate creation across processes, so two
//! processes that miss at the same time both create and the last save wins.

use super::db::DbPool;
use super::types::{CacheEntry, format_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status of the cache slot, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub resource_id: String,
    pub created_at: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    pub is_valid: bool,
}

/// The `cluster_cache` table
#[derive(Debug, Clone)]
pub struct SingleSlotCache {
    pool: DbPool,
}

impl SingleSlotCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Read the cached cluster, expired or not
    pub async fn load(&self) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            "SELECT resource_id, created_at, expiry_time FROM cluster_cache WHERE slot = 0",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(CacheEntry::from_row).transpose()
    }

    /// Store an entry, replacing whatever was there
    pub async fn save(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO cluster_cache (slot, resource_id, created_at, expiry_time)
             VALUES (0, ?, ?, ?)
             ON CONFLICT(slot) DO UPDATE SET
                 resource_id = excluded.resource_id,
                 created_at = excluded.created_at,
                 expiry_time = excluded.expiry_time",
        )
        .bind(&entry.resource_id)
        .bind(format_timestamp(entry.created_at))
        .bind(format_timestamp(entry.expiry_time))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Empty the slot; false if it was already empty
    pub async fn clear(&self) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cluster_cache WHERE slot = 0")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Empty the slot only if it still holds `resource_id`
    pub async fn clear_if(&self, resource_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cluster_cache WHERE slot = 0 AND resource_id = ?")
            .bind(resource_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Whether an entry is still within its lifetime
    ///
    /// Purely time based; the cluster may have been deleted out of band.
    pub fn is_valid(entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        !entry.resource_id.is_empty() && now < entry.expiry_time
    }

    pub async fn info(&self, now: DateTime<Utc>) -> Result<Option<CacheInfo>> {
        Ok(self.load().await?.map(|entry| CacheInfo {
            is_valid: Self::is_valid(&entry, now),
            resource_id: entry.resource_id,
            created_at: entry.created_at,
            expiry_time: entry.expiry_time,
        }))
    }
}
