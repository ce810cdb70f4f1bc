//! Handles returned to callers of the coordinator

use crate::fingerprint::Fingerprint;
use crate::provider::CleanupResult;

/// How a handle's cluster is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum HandleKind {
    /// Reference-counted through the registry
    Shared,
    /// Unregistered cluster owned by one process
    Private,
    /// Held in the single-slot cache until it expires
    Cached,
}

/// A caller's claim on a cluster
///
/// Not `Clone`: each handle accounts for exactly one usage and must be
/// released once.
#[derive(Debug)]
pub struct LeaseHandle {
    resource_id: String,
    fingerprint: Option<Fingerprint>,
    created_by_us: bool,
    kind: HandleKind,
    released: bool,
}

impl LeaseHandle {
    pub(crate) fn shared(resource_id: String, fingerprint: Fingerprint, created_by_us: bool) -> Self {
        Self {
            resource_id,
            fingerprint: Some(fingerprint),
            created_by_us,
            kind: HandleKind::Shared,
            released: false,
        }
    }

    pub(crate) fn private(resource_id: String) -> Self {
        Self {
            resource_id,
            fingerprint: None,
            created_by_us: true,
            kind: HandleKind::Private,
            released: false,
        }
    }

    pub(crate) fn cached(resource_id: String, created_by_us: bool) -> Self {
        Self {
            resource_id,
            fingerprint: None,
            created_by_us,
            kind: HandleKind::Cached,
            released: false,
        }
    }

    /// Provider cluster id
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Sharing fingerprint; `None` for private and cached clusters
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn created_by_us(&self) -> bool {
        self.created_by_us
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn is_shared(&self) -> bool {
        self.kind == HandleKind::Shared
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn mark_released(&mut self) {
        self.released = true;
    }
}

/// What releasing a handle did
///
/// Release never fails; problems are logged and reported here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The handle had already been released; nothing happened
    AlreadyReleased,
    /// Other users remain
    StillInUse(i64),
    /// Last user: registry entry removed and cluster teardown attempted
    Deleted(CleanupResult),
    /// Last user of a cluster owned by another live process; only the
    /// entry was removed
    RecordRemoved,
    /// Nothing to tear down: cached, rejoined, or replaced
    Retained,
    /// The registry could not be updated
    RegistryError(String),
}
