//! Registry record types and timestamp helpers

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use cluster_lease_common::LeaseStatus;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use std::time::Duration;

/// A shared-cluster record, keyed by fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub fingerprint: String,
    pub status: LeaseStatus,
    /// Provider cluster id; set once the record is ready
    pub resource_id: Option<String>,
    /// Process that created (or is creating) the cluster
    pub owner_id: String,
    /// The owner released its handle while others still held theirs
    pub owner_released: bool,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl LeaseRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.get("status");
        let created_at: String = row.get("created_at");
        let expiry_time: String = row.get("expiry_time");

        Ok(Self {
            fingerprint: row.get("fingerprint"),
            status: LeaseStatus::parse(&status)
                .with_context(|| format!("Unknown lease status '{status}'"))?,
            resource_id: row.get("resource_id"),
            owner_id: row.get("owner_id"),
            owner_released: row.get::<i64, _>("owner_released") != 0,
            usage_count: row.get("usage_count"),
            created_at: parse_timestamp(&created_at).context("Invalid created_at timestamp")?,
            expiry_time: parse_timestamp(&expiry_time).context("Invalid expiry_time timestamp")?,
            error_message: row.get("error_message"),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time <= now
    }

    /// The owner released its handle, so whoever releases last deletes the
    /// cluster
    pub fn is_orphaned(&self) -> bool {
        self.owner_released
    }
}

/// The single cached private cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub resource_id: String,
    pub created_at: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
}

impl CacheEntry {
    /// Entry for a cluster created now, valid for `ttl`
    pub fn new(resource_id: impl Into<String>, ttl: Duration) -> Self {
        let created_at = now();
        Self {
            resource_id: resource_id.into(),
            created_at,
            expiry_time: expiry_from(created_at, ttl),
        }
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let created_at: String = row.get("created_at");
        let expiry_time: String = row.get("expiry_time");

        Ok(Self {
            resource_id: row.get("resource_id"),
            created_at: parse_timestamp(&created_at).context("Invalid created_at timestamp")?,
            expiry_time: parse_timestamp(&expiry_time).context("Invalid expiry_time timestamp")?,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time <= now
    }
}

/// Current time at storage precision
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Format a timestamp for storage
///
/// Fixed-width UTC with millisecond precision, so string order matches time
/// order inside SQL comparisons.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// 9999-12-31T23:59:59Z, the last instant with a four-digit year
const LATEST_STORABLE_SECS: i64 = 253_402_300_799;

fn latest_storable() -> DateTime<Utc> {
    DateTime::from_timestamp(LATEST_STORABLE_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now + ttl`, saturating at the latest storable time
pub fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .map_or_else(latest_storable, |ts| ts.min(latest_storable()))
}

/// `now - age`, saturating at the Unix epoch
pub fn cutoff_before(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(age)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .map_or(DateTime::UNIX_EPOCH, |ts| ts.max(DateTime::UNIX_EPOCH))
}
