//! Status of a lease record in the registry
//!
//! These values are persisted as text and must remain stable.

/// Lease lifecycle: `Creating -> Ready | Failed`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum LeaseStatus {
    /// A single process is provisioning the cluster
    #[strum(serialize = "creating")]
    Creating,
    /// The cluster exists and can be joined
    #[strum(serialize = "ready")]
    Ready,
    /// Provisioning failed; terminal for this attempt
    #[strum(serialize = "failed")]
    Failed,
}

impl LeaseStatus {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Creating => "creating",
            LeaseStatus::Ready => "ready",
            LeaseStatus::Failed => "failed",
        }
    }

    /// Parse from the stored representation, returning None for unknown values
    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}
