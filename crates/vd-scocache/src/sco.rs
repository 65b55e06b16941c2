use vd_core::{CloneId, SconId};

use crate::mount_point::MountPointId;

/// Admission/eviction class of a cached SCO (spec §4.5). Transitions are
/// forward-only: `NonDisposable` -> `Disposable`, matching the Invariant 2
/// state machine on `(SconId, CloneId)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoClass {
    NonDisposable,
    Disposable,
}

pub struct ScoEntry {
    pub namespace: String,
    pub mount: MountPointId,
    pub size_bytes: u64,
    pub class: ScoClass,
    pub last_used: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScoKey {
    pub sco: SconId,
    pub clone_id: CloneId,
}

impl ScoKey {
    pub fn new(sco: SconId, clone_id: CloneId) -> Self {
        Self { sco, clone_id }
    }
}
