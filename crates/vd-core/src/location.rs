use std::fmt;

use serde::{Deserialize, Serialize};

/// A 512-byte sector index, as addressed by clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lba(pub u64);

/// Logical cluster index within a volume (`lba / cluster_multiplier`).
///
/// Monotonic and dense: CA 0, 1, 2, ... address every cluster a volume can
/// hold, whether or not it has ever been written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterAddress(pub u64);

impl ClusterAddress {
    /// Translate an `lba` into a `ClusterAddress`, given the volume's
    /// `cluster_multiplier` (lbas per cluster). Returns `None` if `lba` is
    /// not aligned to a cluster boundary.
    pub fn from_lba(lba: Lba, cluster_multiplier: u32) -> Option<Self> {
        if lba.0 % cluster_multiplier as u64 != 0 {
            return None;
        }
        Some(ClusterAddress(lba.0 / cluster_multiplier as u64))
    }

    pub fn to_lba(self, cluster_multiplier: u32) -> Lba {
        Lba(self.0 * cluster_multiplier as u64)
    }

    pub fn checked_add(self, n: u64) -> Option<Self> {
        self.0.checked_add(n).map(ClusterAddress)
    }
}

impl fmt::Display for ClusterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ca:{}", self.0)
    }
}

/// Identifies a lineage level within a volume's clone ancestry. `0` is the
/// volume's own data; `1..` walk up to parents, per the `NSIDMap` (spec §3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CloneId(pub u8);

/// Monotonically assigned SCO number, unique within a `(volume, CloneId)` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SconId(pub u32);

impl fmt::Display for SconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}", self.0)
    }
}

/// Physical location of a single cluster: which SCO, at which lineage level,
/// at which cluster offset within the SCO.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterLocation {
    pub sco: SconId,
    pub clone_id: CloneId,
    /// Cluster offset within the SCO, in `[0, sco_multiplier)`.
    pub offset: u8,
}

impl ClusterLocation {
    pub fn new(sco: SconId, clone_id: CloneId, offset: u8) -> Self {
        Self { sco, clone_id, offset }
    }

    /// The backend object name for the SCO this location lives in, per
    /// spec §6: `<sconumber>_<cloneid>`.
    pub fn sco_name(&self) -> String {
        format!("{}_{}", self.sco, self.clone_id.0)
    }
}

impl fmt::Display for ClusterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.offset, self.sco, self.clone_id.0)
    }
}
