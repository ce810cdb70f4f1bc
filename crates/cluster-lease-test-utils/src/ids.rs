//! Owner id generation for simulated processes

use chrono::Utc;

/// Generate a unique owner id for a simulated process.
///
/// Format: `test-{label}-{timestamp_ms}-{counter}`.
///
/// # Example
///
/// ```
/// use cluster_lease_test_utils::ids::test_owner_id;
///
/// let owner = test_owner_id("runner");
/// assert!(owner.starts_with("test-runner-"));
/// ```
pub fn test_owner_id(label: &str) -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{label}-{ts}-{counter}")
}
