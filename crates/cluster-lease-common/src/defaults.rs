//! Default configuration values shared between the library and the CLI
//!
//! These constants ensure consistent defaults across all cluster-lease components.

/// Hours a shared cluster stays reusable after it becomes ready
pub const DEFAULT_EXPIRY_HOURS: u64 = 4;

/// Seconds between registry polls while waiting for another creator
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 10;

/// Seconds to wait for another process's creation before giving up (30 minutes)
pub const DEFAULT_ACQUIRE_TIMEOUT_SECONDS: u64 = 1800;

/// Fall back to a private cluster when a shared one cannot be joined
pub const DEFAULT_ALLOW_FALLBACK: bool = true;

/// Minutes after which a record stuck in `creating` may be taken over
pub const DEFAULT_CREATION_TIMEOUT_MINUTES: u64 = 60;

/// SQLite busy timeout in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Name given to clusters without an explicit name
pub const DEFAULT_CLUSTER_NAME_PREFIX: &str = "cluster-lease";

// Serde default functions for struct field defaults

/// Returns the default expiry in hours
pub fn default_expiry_hours() -> u64 {
    DEFAULT_EXPIRY_HOURS
}

/// Returns the default poll interval in seconds
pub fn default_poll_interval_seconds() -> u64 {
    DEFAULT_POLL_INTERVAL_SECONDS
}

/// Returns the default acquire timeout in seconds
pub fn default_acquire_timeout_seconds() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECONDS
}

/// Returns the default fallback setting
pub fn default_allow_fallback() -> bool {
    DEFAULT_ALLOW_FALLBACK
}

/// Returns the default creation timeout in minutes
pub fn default_creation_timeout_minutes() -> u64 {
    DEFAULT_CREATION_TIMEOUT_MINUTES
}

/// Returns the default SQLite busy timeout
pub fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
