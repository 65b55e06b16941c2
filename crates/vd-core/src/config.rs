use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::OwnerTag;

/// When to populate the process-global cluster cache relative to a read/write
/// (spec §4.1 step 5).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterCacheMode {
    #[default]
    NoCache,
    CacheOnRead,
    CacheOnWrite,
}

/// `NSIDMap`: per-volume map from `CloneId` to the backend namespace that
/// lineage level's SCOs live in (spec §3, Glossary). Bounded to 256 entries,
/// one per possible `CloneId`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NsidMap {
    /// `levels[clone_id as usize]` is the backend namespace for that level,
    /// or `None` if this volume's lineage does not reach that deep.
    levels: Vec<Option<String>>,
}

impl NsidMap {
    pub const MAX_LEVELS: usize = 256;

    pub fn new() -> Self {
        Self { levels: Vec::new() }
    }

    pub fn set(&mut self, clone_id: crate::CloneId, namespace: impl Into<String>) {
        let idx = clone_id.0 as usize;
        if self.levels.len() <= idx {
            self.levels.resize(idx + 1, None);
        }
        self.levels[idx] = Some(namespace.into());
    }

    pub fn get(&self, clone_id: crate::CloneId) -> Option<&str> {
        self.levels.get(clone_id.0 as usize)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Seed slots `1..` from `parent`'s own lineage levels, shifted down one
    /// (parent's level 0 becomes this map's level 1, parent's level 1
    /// becomes this map's level 2, and so on) — spec §4.1 "Clone": "a new
    /// volume ... with an NSIDMap whose slot 1+ points at the parent's
    /// lineage".
    pub fn extend_from_parent(&mut self, parent: &NsidMap) {
        for (i, level) in parent.levels.iter().enumerate() {
            if let Some(ns) = level {
                if let Ok(slot) = u8::try_from(i + 1) {
                    self.set(crate::CloneId(slot), ns.clone());
                }
            }
        }
    }
}

/// Serialized as the `volume_configuration` backend object (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub volume_id: Uuid,
    pub namespace: String,
    /// `(namespace, snapshot_name)` of the parent this volume was cloned
    /// from, if any.
    pub parent: Option<(String, String)>,

    pub lba_size: u32,
    pub lba_count: u64,
    pub cluster_multiplier: u32,
    pub sco_multiplier: u32,
    pub tlog_multiplier: u32,

    pub cluster_cache_mode: ClusterCacheMode,
    pub owner_tag: OwnerTag,

    /// Microsecond write throttle once the non-disposable SCO backlog grows
    /// past DataStore's threshold (spec §5); `None` disables throttling.
    pub datastore_throttle_usecs: Option<u64>,
    /// Microsecond write throttle once the FailOverCache backlog grows past
    /// threshold; `None` disables throttling.
    pub foc_throttle_usecs: Option<u64>,
}

impl VolumeConfig {
    pub fn cluster_size(&self) -> u64 {
        self.lba_size as u64 * self.cluster_multiplier as u64
    }

    pub fn sco_size(&self) -> u64 {
        self.cluster_size() * self.sco_multiplier as u64
    }

    pub fn cluster_count(&self) -> u64 {
        self.lba_count / self.cluster_multiplier as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CloneId;

    #[test]
    fn nsid_map_grows_sparsely() {
        let mut m = NsidMap::new();
        m.set(CloneId(0), "vol-ns");
        m.set(CloneId(3), "parent-ns");
        assert_eq!(m.get(CloneId(0)), Some("vol-ns"));
        assert_eq!(m.get(CloneId(1)), None);
        assert_eq!(m.get(CloneId(3)), Some("parent-ns"));
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn cluster_and_sco_sizes() {
        let cfg = VolumeConfig {
            volume_id: Uuid::nil(),
            namespace: "ns".into(),
            parent: None,
            lba_size: 512,
            lba_count: 1 << 20,
            cluster_multiplier: 8,
            sco_multiplier: 1024,
            tlog_multiplier: 20,
            cluster_cache_mode: ClusterCacheMode::NoCache,
            owner_tag: OwnerTag::NONE,
            datastore_throttle_usecs: None,
            foc_throttle_usecs: None,
        };
        assert_eq!(cfg.cluster_size(), 4096);
        assert_eq!(cfg.sco_size(), 4096 * 1024);
    }
}
