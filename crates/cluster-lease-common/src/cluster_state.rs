//! Provider-reported cluster lifecycle states
//!
//! Collapses the provider's richer state machine into the four states the
//! coordinator reasons about.

/// Cluster state as reported by a provider
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
#[strum(ascii_case_insensitive)]
pub enum ClusterState {
    /// Being provisioned, restarted or resized
    #[strum(to_string = "pending", serialize = "restarting", serialize = "resizing")]
    Pending,
    /// Up and accepting work
    #[strum(to_string = "running")]
    Running,
    /// Stopped or stopping
    #[strum(to_string = "terminated", serialize = "terminating")]
    Terminated,
    /// Failed or in an unknown state
    #[strum(to_string = "error", serialize = "unknown")]
    Error,
}

impl ClusterState {
    /// Parse from a provider state string, mapping unrecognized values to `Error`
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or(Self::Error)
    }

    /// Whether the cluster can still serve (or will soon serve) work
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_databricks_states() {
        assert_eq!(ClusterState::parse("PENDING"), ClusterState::Pending);
        assert_eq!(ClusterState::parse("RESTARTING"), ClusterState::Pending);
        assert_eq!(ClusterState::parse("RESIZING"), ClusterState::Pending);
        assert_eq!(ClusterState::parse("RUNNING"), ClusterState::Running);
        assert_eq!(ClusterState::parse("TERMINATING"), ClusterState::Terminated);
        assert_eq!(ClusterState::parse("TERMINATED"), ClusterState::Terminated);
        assert_eq!(ClusterState::parse("ERROR"), ClusterState::Error);
        assert_eq!(ClusterState::parse("UNKNOWN"), ClusterState::Error);
        assert_eq!(ClusterState::parse("SOMETHING_NEW"), ClusterState::Error);
    }

    #[test]
    fn test_is_alive() {
        assert!(ClusterState::Pending.is_alive());
        assert!(ClusterState::Running.is_alive());
        assert!(!ClusterState::Terminated.is_alive());
        assert!(!ClusterState::Error.is_alive());
    }

    #[test]
    fn test_display() {
        assert_eq!(ClusterState::Running.to_string(), "running");
        assert_eq!(ClusterState::Terminated.as_ref(), "terminated");
    }
}
