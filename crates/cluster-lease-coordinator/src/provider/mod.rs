//! Cluster provider abstraction
//!
//! The coordinator only ever creates, inspects and deletes clusters through
//! [`ClusterProvider`], so it can be driven by the Databricks REST adapter in
//! production and by fakes or mocks in tests.

mod databricks;
mod error;
mod retry;

pub use databricks::{DatabricksConfig, DatabricksProvider};
pub use error::{ProviderError, classify_api_error};
pub use retry::RetryingProvider;

use cluster_lease_common::{ClusterSpec, ClusterState};
use std::sync::Arc;
use tracing::{info, warn};

/// Operations on the provider's clusters.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait ClusterProvider: Send + Sync {
    /// Create a cluster and return its id once the provider accepted it
    async fn create(&self, spec: &ClusterSpec) -> Result<String, ProviderError>;

    /// Current lifecycle state of a cluster
    async fn get_status(&self, cluster_id: &str) -> Result<ClusterState, ProviderError>;

    /// Permanently delete a cluster
    async fn delete(&self, cluster_id: &str) -> Result<(), ProviderError>;
}

impl<P: ClusterProvider + ?Sized> ClusterProvider for Arc<P> {
    async fn create(&self, spec: &ClusterSpec) -> Result<String, ProviderError> {
        (**self).create(spec).await
    }

    async fn get_status(&self, cluster_id: &str) -> Result<ClusterState, ProviderError> {
        (**self).get_status(cluster_id).await
    }

    async fn delete(&self, cluster_id: &str) -> Result<(), ProviderError> {
        (**self).delete(cluster_id).await
    }
}

/// Result of a cleanup operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupResult {
    /// Cluster was successfully deleted
    Deleted,
    /// Cluster was already deleted (not found)
    AlreadyDeleted,
    /// Cleanup failed with error
    Failed,
    /// Cluster was skipped (dry run or not ours to delete)
    Skipped,
}

/// Delete a cluster, treating "not found" as success.
///
/// Never returns an error: teardown failures are logged and reported.
pub async fn delete_cluster<P: ClusterProvider + ?Sized>(
    provider: &P,
    cluster_id: &str,
) -> CleanupResult {
    match provider.delete(cluster_id).await {
        Ok(()) => {
            info!(cluster_id = %cluster_id, "Deleted cluster");
            CleanupResult::Deleted
        }
        Err(e) if e.is_not_found() => {
            info!(cluster_id = %cluster_id, "Cluster already deleted");
            CleanupResult::AlreadyDeleted
        }
        Err(e) => {
            warn!(
                cluster_id = %cluster_id,
                error = %e,
                suggestion = ?e.suggestion(),
                "Cluster deletion failed"
            );
            CleanupResult::Failed
        }
    }
}

/// Provider view of a cluster: its state, or `None` if it no longer exists
pub async fn cluster_state<P: ClusterProvider + ?Sized>(
    provider: &P,
    cluster_id: &str,
) -> Result<Option<ClusterState>, ProviderError> {
    match provider.get_status(cluster_id).await {
        Ok(state) => Ok(Some(state)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
