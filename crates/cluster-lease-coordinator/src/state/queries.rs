//! Read-only registry queries

use super::db::DbPool;
use super::types::{LeaseRecord, format_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use cluster_lease_common::LeaseStatus;

const LEASE_COLUMNS: &str = "fingerprint, status, resource_id, owner_id, owner_released, \
     usage_count, created_at, expiry_time, error_message";

/// Fetch the record for a fingerprint
pub async fn get_lease(pool: &DbPool, fingerprint: &str) -> Result<Option<LeaseRecord>> {
    let sql = format!("SELECT {LEASE_COLUMNS} FROM leases WHERE fingerprint = ?");
    let row = sqlx::query(&sql)
        .bind(fingerprint)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(LeaseRecord::from_row).transpose()
}

/// All records, oldest first
pub async fn list_leases(pool: &DbPool) -> Result<Vec<LeaseRecord>> {
    let sql = format!("SELECT {LEASE_COLUMNS} FROM leases ORDER BY created_at, fingerprint");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter().map(LeaseRecord::from_row).collect()
}

/// Failed records created before `cutoff`
pub async fn failed_leases_before(
    pool: &DbPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<LeaseRecord>> {
    let sql = format!(
        "SELECT {LEASE_COLUMNS} FROM leases
         WHERE status = ? AND created_at < ?
         ORDER BY created_at"
    );
    let rows = sqlx::query(&sql)
        .bind(LeaseStatus::Failed.as_str())
        .bind(format_timestamp(cutoff))
        .fetch_all(pool)
        .await?;

    rows.iter().map(LeaseRecord::from_row).collect()
}
