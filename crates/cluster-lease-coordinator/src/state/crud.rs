//! Atomic lease primitives
//!
//! Each function is a single statement and therefore atomic across every
//! process sharing the registry file. Conditional updates report whether they
//! matched, and callers decide what a miss means.

use super::db::DbPool;
use super::types::{LeaseRecord, expiry_from, format_timestamp, now};
use anyhow::Result;
use chrono::{DateTime, Utc};
use cluster_lease_common::LeaseStatus;
use std::time::Duration;

const RETURNING_LEASE: &str = "RETURNING fingerprint, status, resource_id, owner_id, \
     owner_released, usage_count, created_at, expiry_time, error_message";

/// Claim the creator role for a fingerprint
///
/// Inserts a `creating` record unless one already exists. Returns true if this
/// caller won the claim. The expiry is fixed here and never extended.
pub async fn try_begin_creating(
    pool: &DbPool,
    fingerprint: &str,
    owner_id: &str,
    expiry: Duration,
) -> Result<bool> {
    let created_at = now();

    let result = sqlx::query(
        "INSERT INTO leases (fingerprint, status, owner_id, usage_count, created_at, expiry_time)
         VALUES (?, ?, ?, 0, ?, ?)
         ON CONFLICT(fingerprint) DO NOTHING",
    )
    .bind(fingerprint)
    .bind(LeaseStatus::Creating.as_str())
    .bind(owner_id)
    .bind(format_timestamp(created_at))
    .bind(format_timestamp(expiry_from(created_at, expiry)))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Publish a created cluster, counting the creator as its first user
///
/// Only succeeds while the caller still holds the `creating` record it
/// inserted; a record taken over or removed in the meantime is left alone.
pub async fn set_ready(
    pool: &DbPool,
    fingerprint: &str,
    owner_id: &str,
    resource_id: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE leases SET status = ?, resource_id = ?, usage_count = 1, error_message = NULL
         WHERE fingerprint = ? AND owner_id = ? AND status = ?",
    )
    .bind(LeaseStatus::Ready.as_str())
    .bind(resource_id)
    .bind(fingerprint)
    .bind(owner_id)
    .bind(LeaseStatus::Creating.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record that creation failed so waiters stop waiting
pub async fn set_failed(
    pool: &DbPool,
    fingerprint: &str,
    owner_id: &str,
    message: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE leases SET status = ?, error_message = ?
         WHERE fingerprint = ? AND owner_id = ? AND status = ?",
    )
    .bind(LeaseStatus::Failed.as_str())
    .bind(message)
    .bind(fingerprint)
    .bind(owner_id)
    .bind(LeaseStatus::Creating.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Join a ready cluster
///
/// Returns the updated record (new usage count and the cluster id), or `None`
/// if the record is not ready or gone.
pub async fn increment_usage(pool: &DbPool, fingerprint: &str) -> Result<Option<LeaseRecord>> {
    let sql = format!(
        "UPDATE leases SET usage_count = usage_count + 1
         WHERE fingerprint = ? AND status = ?
         {RETURNING_LEASE}"
    );
    let row = sqlx::query(&sql)
        .bind(fingerprint)
        .bind(LeaseStatus::Ready.as_str())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(LeaseRecord::from_row).transpose()
}

/// Leave a cluster, returning the remaining usage count
///
/// Only counts against the record still pointing at `resource_id`, so a
/// handle to a removed cluster cannot release a newer one. Never drops below
/// zero. A missing or replaced record reports zero.
pub async fn decrement_usage(pool: &DbPool, fingerprint: &str, resource_id: &str) -> Result<i64> {
    let count: Option<i64> = sqlx::query_scalar(
        "UPDATE leases SET usage_count = usage_count - 1
         WHERE fingerprint = ? AND resource_id = ? AND usage_count > 0
         RETURNING usage_count",
    )
    .bind(fingerprint)
    .bind(resource_id)
    .fetch_optional(pool)
    .await?;

    Ok(count.unwrap_or(0))
}

/// Note that the owner released while others still use the cluster
pub async fn mark_owner_released(pool: &DbPool, fingerprint: &str, owner_id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE leases SET owner_released = 1 WHERE fingerprint = ? AND owner_id = ?",
    )
    .bind(fingerprint)
    .bind(owner_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Take responsibility for tearing down an unused cluster
///
/// Deletes the record only if it is ready, points at `resource_id` and has no
/// users, returning what was deleted. Exactly one caller can win; joiners that
/// arrive afterwards see no record and start a fresh creation.
pub async fn claim_teardown(
    pool: &DbPool,
    fingerprint: &str,
    resource_id: &str,
) -> Result<Option<LeaseRecord>> {
    let sql = format!(
        "DELETE FROM leases
         WHERE fingerprint = ? AND resource_id = ? AND status = ? AND usage_count = 0
         {RETURNING_LEASE}"
    );
    let row = sqlx::query(&sql)
        .bind(fingerprint)
        .bind(resource_id)
        .bind(LeaseStatus::Ready.as_str())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(LeaseRecord::from_row).transpose()
}

/// Remove a `creating` record whose creator started before `cutoff`
pub async fn remove_stale_creating(
    pool: &DbPool,
    fingerprint: &str,
    cutoff: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM leases WHERE fingerprint = ? AND status = ? AND created_at < ?",
    )
    .bind(fingerprint)
    .bind(LeaseStatus::Creating.as_str())
    .bind(format_timestamp(cutoff))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete exactly the record generation that was observed
///
/// A record recreated under the same fingerprint since `record` was read has a
/// different owner or creation time and is not touched.
pub async fn delete_generation(pool: &DbPool, record: &LeaseRecord) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM leases
         WHERE fingerprint = ? AND status = ? AND owner_id = ? AND created_at = ?",
    )
    .bind(&record.fingerprint)
    .bind(record.status.as_str())
    .bind(&record.owner_id)
    .bind(format_timestamp(record.created_at))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Unconditionally delete a record
pub async fn delete_lease(pool: &DbPool, fingerprint: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM leases WHERE fingerprint = ?")
        .bind(fingerprint)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::db::open_test_db;
    use crate::state::queries::get_lease;
    use chrono::TimeDelta;

    const FP: &str = "a1b2c3d4e5f6";
    const TTL: Duration = Duration::from_secs(4 * 3600);

    async fn backdate(pool: &DbPool, fingerprint: &str, age: TimeDelta) {
        sqlx::query("UPDATE leases SET created_at = ? WHERE fingerprint = ?")
            .bind(format_timestamp(now() - age))
            .bind(fingerprint)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_only_one_creator_wins() {
        let pool = open_test_db().await.unwrap();

        assert!(try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap());
        assert!(!try_begin_creating(&pool, FP, "owner-b", TTL).await.unwrap());

        let record = get_lease(&pool, FP).await.unwrap().unwrap();
        assert_eq!(record.status, LeaseStatus::Creating);
        assert_eq!(record.owner_id, "owner-a");
        assert_eq!(record.usage_count, 0);
        assert_eq!(record.resource_id, None);
        assert_eq!(record.expiry_time - record.created_at, TimeDelta::hours(4));
    }

    #[tokio::test]
    async fn test_set_ready_counts_creator() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();

        assert!(set_ready(&pool, FP, "owner-a", "0101-abc").await.unwrap());

        let record = get_lease(&pool, FP).await.unwrap().unwrap();
        assert_eq!(record.status, LeaseStatus::Ready);
        assert_eq!(record.resource_id.as_deref(), Some("0101-abc"));
        assert_eq!(record.usage_count, 1);
    }

    #[tokio::test]
    async fn test_set_ready_requires_owner_and_creating() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();

        assert!(!set_ready(&pool, FP, "owner-b", "0101-abc").await.unwrap());
        assert!(set_ready(&pool, FP, "owner-a", "0101-abc").await.unwrap());
        // Already ready
        assert!(!set_ready(&pool, FP, "owner-a", "0101-xyz").await.unwrap());
        assert!(!set_ready(&pool, "missing", "owner-a", "0101-abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_record_is_never_joinable() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();

        assert!(set_failed(&pool, FP, "owner-a", "quota exceeded").await.unwrap());
        assert_eq!(increment_usage(&pool, FP).await.unwrap(), None);

        let record = get_lease(&pool, FP).await.unwrap().unwrap();
        assert_eq!(record.status, LeaseStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("quota exceeded"));
        assert_eq!(record.usage_count, 0);
    }

    #[tokio::test]
    async fn test_creating_record_is_not_joinable() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();

        assert_eq!(increment_usage(&pool, FP).await.unwrap(), None);
        assert_eq!(increment_usage(&pool, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_usage_counting() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();
        set_ready(&pool, FP, "owner-a", "0101-abc").await.unwrap();

        let joined = increment_usage(&pool, FP).await.unwrap().unwrap();
        assert_eq!(joined.usage_count, 2);
        assert_eq!(joined.resource_id.as_deref(), Some("0101-abc"));
        let joined = increment_usage(&pool, FP).await.unwrap().unwrap();
        assert_eq!(joined.usage_count, 3);
        assert_eq!(decrement_usage(&pool, FP, "0101-abc").await.unwrap(), 2);
        assert_eq!(decrement_usage(&pool, FP, "0101-abc").await.unwrap(), 1);
        assert_eq!(decrement_usage(&pool, FP, "0101-abc").await.unwrap(), 0);
        // Floor at zero
        assert_eq!(decrement_usage(&pool, FP, "0101-abc").await.unwrap(), 0);

        let record = get_lease(&pool, FP).await.unwrap().unwrap();
        assert_eq!(record.usage_count, 0);
        assert_eq!(decrement_usage(&pool, "missing", "0101-abc").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_decrement_ignores_other_cluster() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-b", TTL).await.unwrap();
        set_ready(&pool, FP, "owner-b", "0101-new").await.unwrap();

        // A handle to an earlier cluster under the same fingerprint
        assert_eq!(decrement_usage(&pool, FP, "0101-old").await.unwrap(), 0);

        let record = get_lease(&pool, FP).await.unwrap().unwrap();
        assert_eq!(record.usage_count, 1);
        assert_eq!(decrement_usage(&pool, FP, "0101-new").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_teardown_only_when_unused() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();
        set_ready(&pool, FP, "owner-a", "0101-abc").await.unwrap();

        assert!(claim_teardown(&pool, FP, "0101-abc").await.unwrap().is_none());

        decrement_usage(&pool, FP, "0101-abc").await.unwrap();
        assert!(claim_teardown(&pool, FP, "0101-other").await.unwrap().is_none());

        let claimed = claim_teardown(&pool, FP, "0101-abc").await.unwrap().unwrap();
        assert_eq!(claimed.owner_id, "owner-a");
        assert_eq!(claimed.resource_id.as_deref(), Some("0101-abc"));

        // Second claimer loses
        assert!(claim_teardown(&pool, FP, "0101-abc").await.unwrap().is_none());
        assert!(get_lease(&pool, FP).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_owner_released() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();
        set_ready(&pool, FP, "owner-a", "0101-abc").await.unwrap();

        assert!(!mark_owner_released(&pool, FP, "owner-b").await.unwrap());
        assert!(!get_lease(&pool, FP).await.unwrap().unwrap().is_orphaned());

        assert!(mark_owner_released(&pool, FP, "owner-a").await.unwrap());
        assert!(get_lease(&pool, FP).await.unwrap().unwrap().is_orphaned());
    }

    #[tokio::test]
    async fn test_remove_stale_creating() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();

        let cutoff = now() - TimeDelta::minutes(60);
        assert!(!remove_stale_creating(&pool, FP, cutoff).await.unwrap());

        backdate(&pool, FP, TimeDelta::minutes(61)).await;
        assert!(remove_stale_creating(&pool, FP, cutoff).await.unwrap());
        assert!(get_lease(&pool, FP).await.unwrap().is_none());

        // The next caller becomes creator
        assert!(try_begin_creating(&pool, FP, "owner-b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_stale_creating_ignores_ready() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();
        set_ready(&pool, FP, "owner-a", "0101-abc").await.unwrap();
        backdate(&pool, FP, TimeDelta::hours(2)).await;

        assert!(!remove_stale_creating(&pool, FP, now()).await.unwrap());
        assert!(get_lease(&pool, FP).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_taken_over_creator_cannot_publish() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "slow", TTL).await.unwrap();
        backdate(&pool, FP, TimeDelta::hours(2)).await;

        remove_stale_creating(&pool, FP, now() - TimeDelta::hours(1))
            .await
            .unwrap();
        try_begin_creating(&pool, FP, "fresh", TTL).await.unwrap();

        assert!(!set_ready(&pool, FP, "slow", "0101-late").await.unwrap());
        assert!(!set_failed(&pool, FP, "slow", "late").await.unwrap());

        let record = get_lease(&pool, FP).await.unwrap().unwrap();
        assert_eq!(record.owner_id, "fresh");
        assert_eq!(record.status, LeaseStatus::Creating);
    }

    #[tokio::test]
    async fn test_delete_generation_skips_recreated_record() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();
        set_failed(&pool, FP, "owner-a", "boom").await.unwrap();
        let observed = get_lease(&pool, FP).await.unwrap().unwrap();

        delete_lease(&pool, FP).await.unwrap();
        try_begin_creating(&pool, FP, "owner-b", TTL).await.unwrap();

        assert!(!delete_generation(&pool, &observed).await.unwrap());
        assert!(get_lease(&pool, FP).await.unwrap().is_some());

        let current = get_lease(&pool, FP).await.unwrap().unwrap();
        assert!(delete_generation(&pool, &current).await.unwrap());
        assert!(get_lease(&pool, FP).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_lease() {
        let pool = open_test_db().await.unwrap();
        try_begin_creating(&pool, FP, "owner-a", TTL).await.unwrap();

        assert!(delete_lease(&pool, FP).await.unwrap());
        assert!(!delete_lease(&pool, FP).await.unwrap());
    }
}
