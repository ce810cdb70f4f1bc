//! Custom tag keys for cluster-lease managed clusters
//!
//! Every cluster created through the coordinator carries these tags so that
//! leaked clusters can be attributed and cleaned up from the provider console.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `cluster-lease-tool` | Static identifier ("cluster-lease") |
//! | `cluster-lease-fingerprint` | Sharing fingerprint, or "private" |
//! | `cluster-lease-owner` | Owner id of the creating process |

/// Tag key for tool identification - all managed clusters have this
pub const TAG_TOOL: &str = "cluster-lease-tool";

/// Tag value for tool identification
pub const TAG_TOOL_VALUE: &str = "cluster-lease";

/// Tag key for the sharing fingerprint
pub const TAG_FINGERPRINT: &str = "cluster-lease-fingerprint";

/// Tag key for the creating process
pub const TAG_OWNER: &str = "cluster-lease-owner";

/// Fingerprint tag value for unshared (fallback or cached) clusters
pub const PRIVATE_FINGERPRINT: &str = "private";
