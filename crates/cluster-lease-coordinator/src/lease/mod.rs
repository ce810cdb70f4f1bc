//! Lease coordination for shared clusters
//!
//! [`LeaseCoordinator`] hands out [`LeaseHandle`]s: shared clusters joined or
//! created through the registry, private fallback clusters, and the single
//! cached cluster. The sweep reconciles the registry with the provider.

mod coordinator;
mod error;
mod handle;
mod sweep;

// Re-export core types
pub use coordinator::{LeaseCoordinator, new_owner_id};
pub use error::LeaseError;
pub use handle::{HandleKind, LeaseHandle, ReleaseOutcome};
pub use sweep::{StaleReason, SweepAction, SweepFinding, SweepOptions, SweepReport};
