//! Create-or-join state machine for shared clusters
//!
//! Per fingerprint the registry record moves `creating -> ready | failed`. A
//! ready record lives until its usage count drops to zero, at which point the
//! last releaser removes it. A failed record is cleared by the next caller.
//! Provider calls never run inside a registry statement.

use super::error::LeaseError;
use super::handle::{HandleKind, LeaseHandle, ReleaseOutcome};
use crate::fingerprint::Fingerprint;
use crate::provider::{ClusterProvider, cluster_state, delete_cluster};
use crate::state::{
    self, CacheEntry, DbPool, LeaseRecord, SingleSlotCache, claim_teardown, cutoff_before,
    decrement_usage, delete_generation, get_lease, increment_usage, mark_owner_released,
    remove_stale_creating, set_failed, set_ready, try_begin_creating,
};
use crate::wait::{WaitConfig, WaitError, wait_for_resource};
use anyhow::Context;
use cluster_lease_common::defaults::DEFAULT_CLUSTER_NAME_PREFIX;
use cluster_lease_common::tags::{
    PRIVATE_FINGERPRINT, TAG_FINGERPRINT, TAG_OWNER, TAG_TOOL, TAG_TOOL_VALUE,
};
use cluster_lease_common::{ClusterSpec, ClusterState, LeaseConfig, LeaseStatus};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How a wait on another process's creation ended
enum Resolution {
    Joined(LeaseRecord),
    Failed(String),
    /// The record disappeared; start over from the top
    Vanished,
}

/// Generate an owner id unique to this coordinator instance
pub fn new_owner_id() -> String {
    format!("{}-{}", std::process::id(), uuid::Uuid::now_v7())
}

/// Coordinates cluster sharing through the registry
pub struct LeaseCoordinator<P> {
    pool: DbPool,
    provider: P,
    config: LeaseConfig,
    owner_id: String,
    cache: SingleSlotCache,
}

impl<P: ClusterProvider> LeaseCoordinator<P> {
    pub fn new(pool: DbPool, provider: P, config: LeaseConfig) -> Self {
        Self {
            cache: SingleSlotCache::new(pool.clone()),
            pool,
            provider,
            config,
            owner_id: new_owner_id(),
        }
    }

    /// Open the registry named by `config` (or the default path)
    pub async fn open(config: LeaseConfig, provider: P) -> anyhow::Result<Self> {
        let path = match &config.db_path {
            Some(path) => path.clone(),
            None => state::default_db_path()?,
        };
        let pool = state::open_db(&path, config.busy_timeout())
            .await
            .with_context(|| format!("Failed to open lease registry at {}", path.display()))?;

        Ok(Self::new(pool, provider, config))
    }

    pub fn with_owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub fn cache(&self) -> &SingleSlotCache {
        &self.cache
    }

    /// Spec as sent to the provider: identifying tags added, a name for
    /// shared clusters
    fn tagged_spec(&self, spec: &ClusterSpec, fingerprint: Option<&Fingerprint>) -> ClusterSpec {
        let mut tagged = spec
            .clone()
            .with_tag(TAG_TOOL, TAG_TOOL_VALUE)
            .with_tag(
                TAG_FINGERPRINT,
                fingerprint.map_or(PRIVATE_FINGERPRINT, Fingerprint::as_str),
            )
            .with_tag(TAG_OWNER, &self.owner_id);

        if tagged.cluster_name.is_none() {
            tagged.cluster_name =
                fingerprint.map(|fp| format!("{DEFAULT_CLUSTER_NAME_PREFIX}-{}", fp.short()));
        }
        tagged
    }

    /// Acquire a shared cluster using the configured timeout and fallback
    pub async fn acquire_shared(&self, spec: &ClusterSpec) -> Result<LeaseHandle, LeaseError> {
        self.acquire_shared_with(spec, self.config.acquire_timeout(), self.config.allow_fallback)
            .await
    }

    /// Acquire a shared cluster matching `spec`
    ///
    /// Joins a ready cluster with the same fingerprint, becomes its creator if
    /// none exists, or waits up to `timeout` for another process's creation.
    /// When the wait times out or the creation fails, a private cluster is
    /// created if `allow_fallback` is set.
    pub async fn acquire_shared_with(
        &self,
        spec: &ClusterSpec,
        timeout: Duration,
        allow_fallback: bool,
    ) -> Result<LeaseHandle, LeaseError> {
        let fingerprint = Fingerprint::compute(spec);
        let fp = fingerprint.as_str();
        let started = Instant::now();

        loop {
            let existing = get_lease(&self.pool, fp).await?;

            match existing {
                Some(record) if record.status == LeaseStatus::Ready => {
                    if let Some(joined) = increment_usage(&self.pool, fp).await? {
                        return Ok(self.joined_handle(joined, fingerprint));
                    }
                    debug!(fingerprint = %fingerprint.short(), "Ready lease vanished before join, retrying");
                    continue;
                }
                Some(record) if record.status == LeaseStatus::Failed => {
                    info!(
                        fingerprint = %fingerprint.short(),
                        error = record.error_message.as_deref().unwrap_or(""),
                        "Clearing failed lease"
                    );
                    delete_generation(&self.pool, &record).await?;
                    continue;
                }
                Some(record) => {
                    let cutoff = cutoff_before(state::now(), self.config.creation_timeout());
                    if record.created_at < cutoff {
                        warn!(
                            fingerprint = %fingerprint.short(),
                            owner_id = %record.owner_id,
                            created_at = %record.created_at,
                            "Taking over stale creation"
                        );
                        remove_stale_creating(&self.pool, fp, cutoff).await?;
                        continue;
                    }
                }
                None => {
                    if try_begin_creating(&self.pool, fp, &self.owner_id, self.config.expiry())
                        .await?
                    {
                        return self.create_as_owner(spec, fingerprint, allow_fallback).await;
                    }
                }
            }

            // Someone else is creating
            let remaining = timeout.saturating_sub(started.elapsed());
            if let Some(handle) = self
                .wait_for_creator(spec, &fingerprint, remaining, timeout, allow_fallback)
                .await?
            {
                return Ok(handle);
            }
            debug!(fingerprint = %fingerprint.short(), "Lease vanished while waiting, retrying");
        }
    }

    fn joined_handle(&self, joined: LeaseRecord, fingerprint: Fingerprint) -> LeaseHandle {
        let resource_id = joined.resource_id.unwrap_or_default();
        info!(
            fingerprint = %fingerprint.short(),
            cluster_id = %resource_id,
            usage_count = joined.usage_count,
            "Joined shared cluster"
        );
        LeaseHandle::shared(resource_id, fingerprint, false)
    }

    async fn create_as_owner(
        &self,
        spec: &ClusterSpec,
        fingerprint: Fingerprint,
        allow_fallback: bool,
    ) -> Result<LeaseHandle, LeaseError> {
        let fp = fingerprint.as_str();
        info!(fingerprint = %fingerprint.short(), owner_id = %self.owner_id, "Creating shared cluster");

        let cluster_id = match self.provider.create(&self.tagged_spec(spec, Some(&fingerprint))).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    fingerprint = %fingerprint.short(),
                    error = %e,
                    suggestion = ?e.suggestion(),
                    "Shared cluster creation failed"
                );
                if let Err(reg) = set_failed(&self.pool, fp, &self.owner_id, &e.to_string()).await {
                    warn!(fingerprint = %fingerprint.short(), error = ?reg, "Failed to record creation failure");
                }
                let err = LeaseError::CreationFailed {
                    fingerprint: fp.to_string(),
                    message: e.to_string(),
                };
                return self.fallback(spec, allow_fallback, err).await;
            }
        };

        match set_ready(&self.pool, fp, &self.owner_id, &cluster_id).await {
            Ok(true) => {
                info!(fingerprint = %fingerprint.short(), cluster_id = %cluster_id, "Shared cluster ready");
                Ok(LeaseHandle::shared(cluster_id, fingerprint, true))
            }
            Ok(false) => {
                warn!(
                    fingerprint = %fingerprint.short(),
                    cluster_id = %cluster_id,
                    "Lease was taken over during creation, keeping cluster private"
                );
                Ok(LeaseHandle::private(cluster_id))
            }
            Err(e) => {
                // Nobody could ever find this cluster again
                delete_cluster(&self.provider, &cluster_id).await;
                Err(LeaseError::Registry(e))
            }
        }
    }

    /// Poll until the creator publishes or fails, for at most `remaining`
    ///
    /// Returns `None` when the record disappeared, so the caller can try to
    /// create it. `timeout` is the caller's full budget, used for reporting.
    async fn wait_for_creator(
        &self,
        spec: &ClusterSpec,
        fingerprint: &Fingerprint,
        remaining: Duration,
        timeout: Duration,
        allow_fallback: bool,
    ) -> Result<Option<LeaseHandle>, LeaseError> {
        let pool = &self.pool;
        let fp = fingerprint.as_str();
        info!(fingerprint = %fingerprint.short(), remaining = ?remaining, "Waiting for another process to create cluster");

        let resolution = wait_for_resource(
            WaitConfig::fixed(self.config.poll_interval(), remaining),
            None,
            move || async move {
                let resolved = match get_lease(pool, fp).await? {
                    Some(r) if r.status == LeaseStatus::Ready => {
                        increment_usage(pool, fp).await?.map(Resolution::Joined)
                    }
                    Some(r) if r.status == LeaseStatus::Failed => Some(Resolution::Failed(
                        r.error_message.unwrap_or_else(|| "unknown error".to_string()),
                    )),
                    Some(_) => None,
                    None => Some(Resolution::Vanished),
                };
                Ok::<_, anyhow::Error>(resolved)
            },
            &format!("shared cluster {}", fingerprint.short()),
        )
        .await;

        let err = match resolution {
            Ok(Resolution::Joined(record)) => {
                return Ok(Some(self.joined_handle(record, fingerprint.clone())));
            }
            Ok(Resolution::Vanished) => return Ok(None),
            Ok(Resolution::Failed(message)) => {
                warn!(fingerprint = %fingerprint.short(), error = %message, "Shared cluster creation failed in another process");
                LeaseError::CreationFailed {
                    fingerprint: fp.to_string(),
                    message,
                }
            }
            Err(WaitError::Timeout { .. }) => {
                warn!(fingerprint = %fingerprint.short(), timeout = ?timeout, "Timed out waiting for shared cluster");
                LeaseError::AcquireTimeout {
                    fingerprint: fp.to_string(),
                    timeout,
                }
            }
            Err(WaitError::Check { source, .. }) => return Err(LeaseError::Registry(source)),
            Err(e) => return Err(LeaseError::Registry(e.into())),
        };

        self.fallback(spec, allow_fallback, err).await.map(Some)
    }

    /// Create an unregistered cluster, or give up with `err`
    async fn fallback(
        &self,
        spec: &ClusterSpec,
        allow_fallback: bool,
        err: LeaseError,
    ) -> Result<LeaseHandle, LeaseError> {
        if !allow_fallback {
            return Err(err);
        }

        info!(reason = %err, "Falling back to a private cluster");
        let cluster_id = self.provider.create(&self.tagged_spec(spec, None)).await?;
        info!(cluster_id = %cluster_id, "Private cluster ready");
        Ok(LeaseHandle::private(cluster_id))
    }

    /// Reuse the cached cluster if it is valid and alive, otherwise create
    /// and cache a new one
    pub async fn acquire_cached(&self, spec: &ClusterSpec) -> Result<LeaseHandle, LeaseError> {
        if let Some(entry) = self.cache.load().await? {
            if SingleSlotCache::is_valid(&entry, state::now()) {
                match cluster_state(&self.provider, &entry.resource_id).await {
                    Ok(Some(s)) if s.is_alive() => {
                        info!(cluster_id = %entry.resource_id, "Reusing cached cluster");
                        return Ok(LeaseHandle::cached(entry.resource_id, false));
                    }
                    Ok(s) => {
                        info!(cluster_id = %entry.resource_id, state = ?s, "Cached cluster is gone, replacing");
                    }
                    Err(e) => {
                        warn!(cluster_id = %entry.resource_id, error = %e, "Could not check cached cluster, replacing");
                    }
                }
            } else {
                info!(cluster_id = %entry.resource_id, expired_at = %entry.expiry_time, "Cached cluster expired, replacing");
                delete_cluster(&self.provider, &entry.resource_id).await;
            }
        }

        let cluster_id = self.provider.create(&self.tagged_spec(spec, None)).await?;
        self.cache
            .save(&CacheEntry::new(&cluster_id, self.config.expiry()))
            .await?;
        info!(cluster_id = %cluster_id, "Cached new cluster");

        Ok(LeaseHandle::cached(cluster_id, true))
    }

    /// Release a handle
    ///
    /// Safe to call more than once. Never fails: registry and provider
    /// problems are logged and reported in the outcome.
    pub async fn release(&self, handle: &mut LeaseHandle) -> ReleaseOutcome {
        if handle.is_released() {
            return ReleaseOutcome::AlreadyReleased;
        }
        handle.mark_released();

        let Some(fingerprint) = handle.fingerprint().cloned() else {
            return self.release_unshared(handle).await;
        };

        match self.release_shared(handle, &fingerprint).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    fingerprint = %fingerprint.short(),
                    cluster_id = %handle.resource_id(),
                    error = ?e,
                    "Failed to update registry on release"
                );
                ReleaseOutcome::RegistryError(format!("{e:#}"))
            }
        }
    }

    async fn release_unshared(&self, handle: &LeaseHandle) -> ReleaseOutcome {
        if handle.kind() == HandleKind::Private && handle.created_by_us() {
            ReleaseOutcome::Deleted(delete_cluster(&self.provider, handle.resource_id()).await)
        } else {
            debug!(cluster_id = %handle.resource_id(), kind = %handle.kind(), "Leaving cluster running");
            ReleaseOutcome::Retained
        }
    }

    async fn release_shared(
        &self,
        handle: &LeaseHandle,
        fingerprint: &Fingerprint,
    ) -> anyhow::Result<ReleaseOutcome> {
        let fp = fingerprint.as_str();
        let cluster_id = handle.resource_id();

        let remaining = decrement_usage(&self.pool, fp, cluster_id).await?;
        if remaining > 0 {
            if handle.created_by_us() {
                mark_owner_released(&self.pool, fp, &self.owner_id).await?;
            }
            info!(fingerprint = %fingerprint.short(), usage_count = remaining, "Released shared cluster, still in use");
            return Ok(ReleaseOutcome::StillInUse(remaining));
        }

        // Removing the record first means nobody joins a cluster being deleted
        let Some(record) = claim_teardown(&self.pool, fp, cluster_id).await? else {
            debug!(fingerprint = %fingerprint.short(), "Lease rejoined, replaced or already removed");
            return Ok(ReleaseOutcome::Retained);
        };

        if record.owner_id == self.owner_id || record.is_orphaned() {
            info!(fingerprint = %fingerprint.short(), cluster_id = %cluster_id, "Last user released, deleting cluster");
            let result = delete_cluster(&self.provider, cluster_id).await;
            return Ok(ReleaseOutcome::Deleted(result));
        }

        match cluster_state(&self.provider, cluster_id).await {
            Ok(None) => {}
            Ok(Some(ClusterState::Terminated | ClusterState::Error)) => {
                let result = delete_cluster(&self.provider, cluster_id).await;
                return Ok(ReleaseOutcome::Deleted(result));
            }
            Ok(Some(state)) => warn!(
                fingerprint = %fingerprint.short(),
                cluster_id = %cluster_id,
                owner_id = %record.owner_id,
                state = %state,
                "Last user released a cluster owned by a live process, leaving it running"
            ),
            Err(e) => warn!(cluster_id = %cluster_id, error = %e, "Could not check cluster on release"),
        }
        Ok(ReleaseOutcome::RecordRemoved)
    }
}
