//! cluster-lease-common - Shared types and utilities
//!
//! This crate provides the types shared by the coordinator library, its CLI
//! and the test utilities, without any database or HTTP dependencies to keep
//! it lightweight.
//!
//! ## Modules
//!
//! - [`cluster_spec`]: Cluster configuration as requested by callers
//! - [`cluster_state`]: Provider-reported cluster lifecycle states
//! - [`defaults`]: Default configuration values
//! - [`error`]: Configuration loading and validation errors
//! - [`lease_config`]: Coordinator tuning knobs
//! - [`lease_status`]: Status of a lease record in the registry
//! - [`tags`]: Custom tag keys stamped on every managed cluster

pub mod cluster_spec;
pub mod cluster_state;
pub mod defaults;
pub mod error;
pub mod lease_config;
pub mod lease_status;
pub mod tags;

// Re-export commonly used types
pub use cluster_spec::{Autoscale, ClusterSpec};
pub use cluster_state::ClusterState;
pub use error::ConfigError;
pub use lease_config::LeaseConfig;
pub use lease_status::LeaseStatus;
