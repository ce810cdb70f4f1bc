//! Retry wrapper for any cluster provider

use super::{ClusterProvider, ProviderError};
use backon::{ExponentialBuilder, Retryable};
use cluster_lease_common::{ClusterSpec, ClusterState};
use std::time::Duration;
use tracing::warn;

/// Retries throttling and transient failures with exponential backoff.
///
/// Errors that retrying cannot fix (not found, rejected requests) are
/// returned immediately.
#[derive(Debug, Clone)]
pub struct RetryingProvider<P> {
    inner: P,
    backoff: ExponentialBuilder,
}

impl<P: ClusterProvider> RetryingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            backoff: ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(2))
                .with_max_delay(Duration::from_secs(30))
                .with_max_times(6),
        }
    }

    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

fn log_retry(operation: &'static str, resource: &str, e: &ProviderError, delay: Duration) {
    match e {
        ProviderError::Throttled => {
            warn!(operation, resource, delay = ?delay, "Provider rate limited, backing off...");
        }
        _ => {
            warn!(operation, resource, delay = ?delay, error = %e, "Transient provider error, retrying...");
        }
    }
}

impl<P: ClusterProvider> ClusterProvider for RetryingProvider<P> {
    async fn create(&self, spec: &ClusterSpec) -> Result<String, ProviderError> {
        let name = spec.cluster_name.as_deref().unwrap_or("<unnamed>");

        (|| async { self.inner.create(spec).await })
            .retry(self.backoff)
            .when(ProviderError::is_retryable)
            .notify(|e, dur| log_retry("create", name, e, dur))
            .await
    }

    async fn get_status(&self, cluster_id: &str) -> Result<ClusterState, ProviderError> {
        (|| async { self.inner.get_status(cluster_id).await })
            .retry(self.backoff)
            .when(ProviderError::is_retryable)
            .notify(|e, dur| log_retry("get_status", cluster_id, e, dur))
            .await
    }

    async fn delete(&self, cluster_id: &str) -> Result<(), ProviderError> {
        (|| async { self.inner.delete(cluster_id).await })
            .retry(self.backoff)
            .when(ProviderError::is_retryable)
            .notify(|e, dur| log_retry("delete", cluster_id, e, dur))
            .await
    }
}
