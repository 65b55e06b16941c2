use vd_core::{ClusterAddress, VolumeError};

/// A read-only handle onto an ancestor volume **as of the snapshot a clone
/// was created from**, used by a clone's read path to fall through to the
/// parent's SCOs for any `ClusterAddress` the clone hasn't itself rewritten
/// yet (spec §4.1 "Clone": "a new volume with an empty metadata store ...
/// reads that miss the child's metadata fall through to the parent's SCOs by
/// CloneID"; spec Invariant 3, snapshot immutability: a clone must keep
/// seeing the parent's bytes as of the snapshot even after the parent is
/// written to again).
///
/// Modeled as a capability/trait object rather than a concrete parent
/// pointer (spec §9: "Pointer graphs ... Callbacks ... become typed function
/// values captured at construction") so a clone doesn't need to share its
/// parent's storage/backend type parameters: each [`crate::Volume`] vends
/// implementors of this trait scoped to a named snapshot via
/// `Volume::snapshot_view`, and a clone is handed the resulting
/// `Arc<dyn ParentLookup>`. A multi-generation clone chain resolves by plain
/// recursion: an ancestor that also misses forwards to its own parent's view
/// (itself already frozen at whatever snapshot the intermediate clone was
/// made from).
pub trait ParentLookup: Send + Sync {
    /// Resolve and read `ca`'s content as seen by this ancestor at the
    /// snapshot boundary this view is scoped to (or, recursively, one
    /// further up its own lineage). `Ok(None)` means no ancestor had
    /// written this CA by that point, so the originating clone's read
    /// should return zeros for it.
    fn read_for_descendant(&self, ca: ClusterAddress, cluster_size: u64) -> Result<Option<Vec<u8>>, VolumeError>;
}
