//! SQLite lease registry shared by every cooperating process
//!
//! Uses sqlx for async database access with a connection pool.

mod cache;
mod cli;
mod crud;
mod db;
mod queries;
mod types;

// Re-export types
pub use cache::{CacheInfo, SingleSlotCache};
pub use db::{DbPool, default_db_path, open_db};
pub use types::{CacheEntry, LeaseRecord, cutoff_before, expiry_from, format_timestamp, now};

// Re-export lease primitives
pub use crud::{
    claim_teardown, decrement_usage, delete_generation, delete_lease, increment_usage,
    mark_owner_released, remove_stale_creating, set_failed, set_ready, try_begin_creating,
};

// Re-export query operations
pub use queries::{failed_leases_before, get_lease, list_leases};

// Re-export CLI operations
pub use cli::{clear_cache_slot, list_lease_records, prune_failed, show_cache_info};

#[cfg(test)]
pub(crate) use db::open_test_db;
