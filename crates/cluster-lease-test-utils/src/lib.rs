//! Shared test utilities for cluster-lease
//!
//! This crate provides common test helpers that can be used across
//! multiple test modules without circular dependencies.
//!
//! ## Modules
//!
//! - [`db`]: Temporary registry files and raw SQLite pools
//! - [`ids`]: Unique owner ids for simulated processes
//! - [`spec`]: Sample cluster specs

pub mod db;
pub mod ids;
pub mod spec;

// Re-export commonly used items
pub use db::{TempRegistry, open_raw_pool};
pub use ids::test_owner_id;
pub use spec::{sample_spec, sample_spec_variant};
