//! SnapshotManagement: the snapshot graph, clone lineage and scrub-id
//! tracking for a single volume (spec §3 "Snapshot", §4.1 "Snapshot create"
//! / "Clone", §4.6).
//!
//! Grounded on `commitlog::commitlog::Generic`'s `tail: Vec<u64>` (an ordered
//! list of segment boundaries) generalized to an ordered list of named
//! snapshot boundaries over TLogs.

mod error;
mod manager;

pub use error::SnapshotError;
pub use manager::{Snapshot, SnapshotManagement, SnapshotList};
