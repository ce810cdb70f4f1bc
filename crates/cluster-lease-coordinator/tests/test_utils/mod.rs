//! Shared test utilities for integration tests
//!
//! A recording in-memory provider and helpers that open one coordinator per
//! simulated process on a shared registry file.
//! Generic utilities (temp registries, owner ids, sample specs) are in
//! cluster-lease-test-utils.

#![allow(dead_code)]

use cluster_lease_common::{ClusterSpec, ClusterState, LeaseConfig};
use cluster_lease_coordinator::lease::LeaseCoordinator;
use cluster_lease_coordinator::provider::{ClusterProvider, ProviderError};
use cluster_lease_test_utils::{TempRegistry, test_owner_id};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    clusters: Mutex<HashMap<String, ClusterState>>,
    created: Mutex<Vec<ClusterSpec>>,
    deleted: Mutex<Vec<String>>,
    failures_left: AtomicU32,
    next_id: AtomicU32,
}

/// In-memory provider that records every call
///
/// Clones share state, so one instance can back several simulated processes
/// the way one Databricks workspace backs many real ones.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<FakeState>,
    create_delay: Duration,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every create take `delay`
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Fail the next `n` creates
    pub fn fail_next_creates(&self, n: u32) {
        self.state.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> usize {
        self.state.created.lock().unwrap().len()
    }

    pub fn created_specs(&self) -> Vec<ClusterSpec> {
        self.state.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.deleted.lock().unwrap().clone()
    }

    pub fn is_alive(&self, cluster_id: &str) -> bool {
        self.state
            .clusters
            .lock()
            .unwrap()
            .get(cluster_id)
            .is_some_and(|s| s.is_alive())
    }

    /// Change a cluster's state behind the registry's back
    pub fn set_state(&self, cluster_id: &str, state: ClusterState) {
        self.state
            .clusters
            .lock()
            .unwrap()
            .insert(cluster_id.to_string(), state);
    }

    /// Make a cluster vanish behind the registry's back
    pub fn forget(&self, cluster_id: &str) {
        self.state.clusters.lock().unwrap().remove(cluster_id);
    }
}

impl ClusterProvider for FakeProvider {
    async fn create(&self, spec: &ClusterSpec) -> Result<String, ProviderError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }

        let failing = self
            .state
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProviderError::Rejected {
                code: "CLUSTER_START_FAILED".into(),
                message: "boom".into(),
            });
        }

        let n = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("fake-{n:04}");
        self.state.created.lock().unwrap().push(spec.clone());
        self.set_state(&id, ClusterState::Running);
        Ok(id)
    }

    async fn get_status(&self, cluster_id: &str) -> Result<ClusterState, ProviderError> {
        self.state
            .clusters
            .lock()
            .unwrap()
            .get(cluster_id)
            .copied()
            .ok_or_else(|| ProviderError::NotFound {
                cluster_id: cluster_id.to_string(),
            })
    }

    async fn delete(&self, cluster_id: &str) -> Result<(), ProviderError> {
        self.state.deleted.lock().unwrap().push(cluster_id.to_string());
        match self.state.clusters.lock().unwrap().remove(cluster_id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound {
                cluster_id: cluster_id.to_string(),
            }),
        }
    }
}

/// Configuration with the shortest allowed poll interval
pub fn fast_config(registry: &TempRegistry) -> LeaseConfig {
    LeaseConfig {
        poll_interval_seconds: 1,
        acquire_timeout_seconds: 10,
        db_path: Some(registry.path().to_path_buf()),
        ..LeaseConfig::default()
    }
}

/// Open a coordinator as a separate simulated process
pub async fn open_process(
    registry: &TempRegistry,
    provider: &FakeProvider,
    label: &str,
) -> LeaseCoordinator<FakeProvider> {
    open_process_with(fast_config(registry), provider, label).await
}

pub async fn open_process_with(
    config: LeaseConfig,
    provider: &FakeProvider,
    label: &str,
) -> LeaseCoordinator<FakeProvider> {
    LeaseCoordinator::open(config, provider.clone())
        .await
        .unwrap()
        .with_owner_id(test_owner_id(label))
}
