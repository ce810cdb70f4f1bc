//! Expiry and reconciliation sweep
//!
//! Finds registry state that no longer matches reality (abandoned creations,
//! failed attempts, clusters that vanished or outlived their expiry) and
//! removes it so the next acquirer starts fresh.

use super::coordinator::LeaseCoordinator;
use crate::provider::{CleanupResult, ClusterProvider, cluster_state, delete_cluster};
use crate::state::{
    self, LeaseRecord, SingleSlotCache, claim_teardown, cutoff_before, delete_generation,
    list_leases,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use cluster_lease_common::{ClusterState, LeaseStatus};
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use tracing::{debug, info, warn};

/// Sweep configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    /// Report what would be done without changing anything
    pub dry_run: bool,
    /// Also delete expired clusters created by other, still-registered owners
    pub reap_foreign: bool,
}

/// Why a record or cache entry was flagged
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum StaleReason {
    #[display("creation abandoned")]
    StuckCreating,
    #[display("failed attempt")]
    FailedAttempt,
    #[display("cluster {_0}")]
    ClusterGone(ClusterState),
    #[display("cluster not found")]
    ClusterMissing,
    #[display("expired")]
    Expired,
    #[display("expired, {_0} users")]
    ExpiredInUse(i64),
    #[display("provider error: {_0}")]
    ProviderError(String),
    #[display("cache expired")]
    CacheExpired,
    #[display("cached cluster gone")]
    CacheClusterGone,
}

/// What the sweep did about a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SweepAction {
    #[display("kept")]
    Kept,
    #[display("would remove")]
    WouldRemove,
    #[display("removed")]
    Removed,
    /// Entry removed and cluster teardown attempted
    #[display("reaped ({_0:?})")]
    Reaped(CleanupResult),
    /// Another process changed the entry first
    #[display("raced")]
    Raced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFinding {
    /// Fingerprint, or `cache` for the single-slot cache
    pub subject: String,
    pub resource_id: Option<String>,
    pub reason: StaleReason,
    pub action: SweepAction,
}

/// Report of a sweep pass
#[derive(Debug, Default)]
pub struct SweepReport {
    pub findings: Vec<SweepFinding>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Entries removed from the registry or cache
    pub fn removed(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| matches!(f.action, SweepAction::Removed | SweepAction::Reaped(_)))
            .count()
    }

    /// Teardowns that failed at the provider
    pub fn failed(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.action == SweepAction::Reaped(CleanupResult::Failed))
            .count()
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec!["Subject", "Cluster", "Reason", "Action"]);
        for finding in &self.findings {
            table.add_row(vec![
                finding.subject.clone(),
                finding.resource_id.clone().unwrap_or_else(|| "-".to_string()),
                finding.reason.to_string(),
                finding.action.to_string(),
            ]);
        }
        table
    }

    fn push(
        &mut self,
        subject: impl Into<String>,
        resource_id: Option<&str>,
        reason: StaleReason,
        action: SweepAction,
    ) {
        let finding = SweepFinding {
            subject: subject.into(),
            resource_id: resource_id.map(str::to_string),
            reason,
            action,
        };
        info!(
            subject = %finding.subject,
            cluster_id = ?finding.resource_id,
            reason = %finding.reason,
            action = %finding.action,
            "Sweep finding"
        );
        self.findings.push(finding);
    }
}

impl<P: ClusterProvider> LeaseCoordinator<P> {
    /// Reconcile the registry and cache with the provider
    pub async fn sweep(&self, options: SweepOptions) -> Result<SweepReport> {
        let now = state::now();
        let stale_cutoff = cutoff_before(now, self.config().creation_timeout());
        let mut report = SweepReport::default();

        let records = list_leases(self.pool()).await?;
        info!(
            count = records.len(),
            dry_run = options.dry_run,
            reap_foreign = options.reap_foreign,
            "Sweeping lease registry"
        );

        for record in records {
            match record.status {
                LeaseStatus::Creating if record.created_at < stale_cutoff => {
                    let action = self.remove_generation(&record, options).await?;
                    report.push(&record.fingerprint, None, StaleReason::StuckCreating, action);
                }
                LeaseStatus::Failed
                    if record.created_at < stale_cutoff || record.is_expired(now) =>
                {
                    let action = self.remove_generation(&record, options).await?;
                    report.push(&record.fingerprint, None, StaleReason::FailedAttempt, action);
                }
                LeaseStatus::Ready => self.sweep_ready(&record, now, options, &mut report).await?,
                _ => debug!(fingerprint = %record.fingerprint, status = %record.status, "Lease is current"),
            }
        }

        self.sweep_cache(now, options, &mut report).await?;

        info!(
            findings = report.findings.len(),
            removed = report.removed(),
            failed = report.failed(),
            "Sweep complete"
        );
        Ok(report)
    }

    async fn remove_generation(
        &self,
        record: &LeaseRecord,
        options: SweepOptions,
    ) -> Result<SweepAction> {
        if options.dry_run {
            return Ok(SweepAction::WouldRemove);
        }
        Ok(if delete_generation(self.pool(), record).await? {
            SweepAction::Removed
        } else {
            SweepAction::Raced
        })
    }

    /// Whether the sweep may delete this record's cluster
    fn may_reap(&self, record: &LeaseRecord, options: SweepOptions) -> bool {
        record.owner_id == self.owner_id() || record.is_orphaned() || options.reap_foreign
    }

    async fn sweep_ready(
        &self,
        record: &LeaseRecord,
        now: DateTime<Utc>,
        options: SweepOptions,
        report: &mut SweepReport,
    ) -> Result<()> {
        let fp = &record.fingerprint;
        let Some(cluster_id) = record.resource_id.as_deref() else {
            let action = self.remove_generation(record, options).await?;
            report.push(fp, None, StaleReason::ClusterMissing, action);
            return Ok(());
        };

        let reason = match cluster_state(self.provider(), cluster_id).await {
            Ok(None) => StaleReason::ClusterMissing,
            Ok(Some(s @ (ClusterState::Terminated | ClusterState::Error))) => {
                StaleReason::ClusterGone(s)
            }
            Ok(Some(_)) if !record.is_expired(now) => return Ok(()),
            Ok(Some(_)) if record.usage_count > 0 => {
                warn!(
                    fingerprint = %fp,
                    cluster_id = %cluster_id,
                    usage_count = record.usage_count,
                    expired_at = %record.expiry_time,
                    "Expired lease still in use"
                );
                report.push(
                    fp,
                    Some(cluster_id),
                    StaleReason::ExpiredInUse(record.usage_count),
                    SweepAction::Kept,
                );
                return Ok(());
            }
            Ok(Some(_)) => StaleReason::Expired,
            Err(e) => {
                warn!(fingerprint = %fp, cluster_id = %cluster_id, error = %e, "Could not check leased cluster");
                report.push(
                    fp,
                    Some(cluster_id),
                    StaleReason::ProviderError(e.to_string()),
                    SweepAction::Kept,
                );
                return Ok(());
            }
        };

        if options.dry_run {
            report.push(fp, Some(cluster_id), reason, SweepAction::WouldRemove);
            return Ok(());
        }

        // A missing or dead cluster is removed whatever its usage; an expired
        // live one only once nobody holds it
        let removed = match reason {
            StaleReason::Expired => claim_teardown(self.pool(), fp, cluster_id).await?.is_some(),
            _ => delete_generation(self.pool(), record).await?,
        };

        let action = if !removed {
            SweepAction::Raced
        } else if reason != StaleReason::ClusterMissing && self.may_reap(record, options) {
            SweepAction::Reaped(delete_cluster(self.provider(), cluster_id).await)
        } else {
            SweepAction::Removed
        };
        report.push(fp, Some(cluster_id), reason, action);
        Ok(())
    }

    async fn sweep_cache(
        &self,
        now: DateTime<Utc>,
        options: SweepOptions,
        report: &mut SweepReport,
    ) -> Result<()> {
        let Some(entry) = self.cache().load().await? else {
            return Ok(());
        };
        let cluster_id = entry.resource_id.as_str();

        let reason = if !SingleSlotCache::is_valid(&entry, now) {
            StaleReason::CacheExpired
        } else {
            match cluster_state(self.provider(), cluster_id).await {
                Ok(Some(s)) if s.is_alive() => return Ok(()),
                Ok(_) => StaleReason::CacheClusterGone,
                Err(e) => {
                    report.push(
                        "cache",
                        Some(cluster_id),
                        StaleReason::ProviderError(e.to_string()),
                        SweepAction::Kept,
                    );
                    return Ok(());
                }
            }
        };

        let action = if options.dry_run {
            SweepAction::WouldRemove
        } else if !self.cache().clear_if(cluster_id).await? {
            SweepAction::Raced
        } else if reason == StaleReason::CacheExpired && !cluster_id.is_empty() {
            SweepAction::Reaped(delete_cluster(self.provider(), cluster_id).await)
        } else {
            SweepAction::Removed
        };
        report.push("cache", Some(cluster_id), reason, action);
        Ok(())
    }
}
