//! Lease acquisition errors

use crate::provider::ProviderError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by lease acquisition
///
/// Release never fails, so it has no counterpart here.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Another process was creating the cluster and did not finish in time
    #[error("Timed out after {timeout:?} waiting for shared cluster {fingerprint}")]
    AcquireTimeout {
        fingerprint: String,
        timeout: Duration,
    },

    /// Creating the shared cluster failed
    #[error("Shared cluster {fingerprint} could not be created: {message}")]
    CreationFailed { fingerprint: String, message: String },

    /// The provider refused or failed a direct create
    #[error("Cluster provider error: {0}")]
    ProviderUnavailable(#[from] ProviderError),

    /// The registry database could not be read or written
    #[error("Lease registry error: {0:#}")]
    Registry(#[from] anyhow::Error),
}

impl LeaseError {
    /// Provider hint for resolving the error, if there is one
    pub fn suggestion(&self) -> Option<String> {
        match self {
            LeaseError::ProviderUnavailable(e) => e.suggestion(),
            _ => None,
        }
    }
}
