use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vd_core::{ClusterAddress, ClusterLocation};
use vd_metadata::Relocation;

/// A unit of scrub work for one snapshot range of one volume (spec §4.6).
#[derive(Clone, Debug)]
pub struct ScrubWork {
    pub namespace: String,
    pub volume_id: Uuid,
    /// `cluster_size = 1 << cluster_exponent`.
    pub cluster_exponent: u32,
    pub sco_size: u64,
    pub snapshot_name: String,
}

impl ScrubWork {
    pub fn cluster_size(&self) -> u64 {
        1u64 << self.cluster_exponent
    }
}

/// A cluster address whose most recent location, within the scrubbed range,
/// is `old_location`. Produced by [`crate::Scrubber::find_live_clusters`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveCluster {
    pub ca: ClusterAddress,
    pub old_location: ClusterLocation,
}

/// Replacement TLog sequence for a snapshot, after compaction folded its
/// range into fresh SCOs (spec §4.6 `TLogRewrite`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TLogRewrite {
    pub snapshot_name: String,
    pub new_tlogs: Vec<Uuid>,
}

/// The full content of a `scrub_result_<uuid>` backend object: what to
/// relocate, the snapshot's new TLog list, and what becomes garbage once
/// both are applied.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrubResultPayload {
    /// Wire version, matching spec §6's "version = 2" for the legacy
    /// boost-serialization archive this format replaces.
    pub version: u32,
    pub relocations: Vec<Relocation>,
    pub tlog_rewrite: TLogRewrite,
    pub garbage: Vec<String>,
}

/// The small pointer object the scrubber hands back to the volume (spec §6
/// `ScrubReply wire`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrubReply {
    pub namespace: String,
    pub snapshot_name: String,
    pub scrub_result_name: String,
}
