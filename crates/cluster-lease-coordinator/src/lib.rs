//! cluster-lease-coordinator - Cross-process lease coordinator for shared clusters
//!
//! Lets many independent processes (test runners, pipeline tasks) share one
//! ephemeral compute cluster per configuration. A SQLite registry on a shared
//! path records which cluster serves which configuration fingerprint and how
//! many processes hold it; the last holder tears it down.

pub mod fingerprint;
pub mod lease;
pub mod provider;
pub mod state;
pub mod wait;

pub use fingerprint::Fingerprint;
pub use lease::{LeaseCoordinator, LeaseError, LeaseHandle, ReleaseOutcome};
pub use provider::{ClusterProvider, DatabricksProvider, ProviderError, RetryingProvider};
