use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SnapshotError;

/// An immutable cut in the TLog sequence (spec §3 "Snapshot").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub uuid: Uuid,
    pub metadata: serde_json::Value,
    /// Cork UUID emitted at creation time; downstream background tasks
    /// order themselves against it (spec §4.1 "Snapshot create").
    pub cork: Uuid,
    /// TLogs finalized since the previous snapshot (or since volume
    /// creation), in order, ending with the snapshot's boundary TLog.
    pub tlogs: Vec<Uuid>,
    pub backend_synced: bool,
    /// Lazy delete (spec §3 "Lifecycles"): data is reclaimed later by
    /// scrub+GC, not removed from the list immediately.
    pub deleted: bool,
}

/// The wire/backend-object form of the snapshot list (spec §6
/// "snapshots.xml / equivalent").
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotList {
    pub snapshots: Vec<Snapshot>,
    /// TLogs finalized since the last snapshot; belong to "current".
    pub current_tlogs: Vec<Uuid>,
    pub scrub_id: Option<u64>,
}

/// In-process snapshot graph for one volume.
#[derive(Debug, Default)]
pub struct SnapshotManagement {
    list: SnapshotList,
}

impl SnapshotManagement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_list(list: SnapshotList) -> Self {
        Self { list }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec_pretty(&self.list)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(Self {
            list: serde_json::from_slice(bytes)?,
        })
    }

    /// Record a TLog finalized for "current" (not yet part of any snapshot).
    pub fn record_tlog(&mut self, tlog: Uuid) {
        self.list.current_tlogs.push(tlog);
    }

    /// Cut a new snapshot at the current TLog boundary (spec §4.1).
    /// `cork` should be freshly generated by the caller so background tasks
    /// can order themselves against it.
    pub fn create_snapshot(
        &mut self,
        name: impl Into<String>,
        metadata: serde_json::Value,
        cork: Uuid,
    ) -> Result<&Snapshot, SnapshotError> {
        let name = name.into();
        if self.list.snapshots.iter().any(|s| s.name == name && !s.deleted) {
            return Err(SnapshotError::AlreadyExists(name));
        }
        let tlogs = std::mem::take(&mut self.list.current_tlogs);
        let snap = Snapshot {
            name,
            uuid: Uuid::new_v4(),
            metadata,
            cork,
            tlogs,
            backend_synced: false,
            deleted: false,
        };
        self.list.snapshots.push(snap);
        Ok(self.list.snapshots.last().unwrap())
    }

    pub fn mark_backend_synced(&mut self, name: &str) -> Result<(), SnapshotError> {
        self.find_mut(name)?.backend_synced = true;
        Ok(())
    }

    /// Lazy delete: mark the snapshot gone; its TLogs/SCOs are reclaimed
    /// later by the Scrubber + GarbageCollector, not removed here.
    pub fn delete_snapshot(&mut self, name: &str) -> Result<(), SnapshotError> {
        self.find_mut(name)?.deleted = true;
        Ok(())
    }

    /// Remove a deleted snapshot's bookkeeping entry once GC has reclaimed
    /// everything it uniquely referenced. Called by the Volume after a
    /// `GarbageCollector::barrier` confirms the reclaim completed.
    pub fn purge_deleted(&mut self, name: &str) -> Result<(), SnapshotError> {
        let idx = self
            .list
            .snapshots
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| SnapshotError::Unknown(name.to_string()))?;
        if !self.list.snapshots[idx].deleted {
            return Err(SnapshotError::Unknown(name.to_string()));
        }
        self.list.snapshots.remove(idx);
        Ok(())
    }

    /// Truncate every snapshot created after `name`, and drop current's
    /// in-flight TLogs (spec §3: "restored (truncates later snapshots)").
    pub fn restore_snapshot(&mut self, name: &str) -> Result<(), SnapshotError> {
        let idx = self
            .list
            .snapshots
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| SnapshotError::Unknown(name.to_string()))?;
        self.list.snapshots.truncate(idx + 1);
        self.list.current_tlogs.clear();
        Ok(())
    }

    pub fn list_snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.list.snapshots.iter().filter(|s| !s.deleted)
    }

    pub fn get(&self, name: &str) -> Result<&Snapshot, SnapshotError> {
        self.list
            .snapshots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SnapshotError::Unknown(name.to_string()))
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Snapshot, SnapshotError> {
        self.list
            .snapshots
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| SnapshotError::Unknown(name.to_string()))
    }

    /// The TLog id that ends the given snapshot's range, used by the
    /// Scrubber to bound `[prev_snapshot+1 .. snapshot]` (spec §4.6).
    pub fn tlogs_in_range(&self, from_exclusive: Option<&str>, to_inclusive: &str) -> Result<Vec<Uuid>, SnapshotError> {
        let to_idx = self
            .list
            .snapshots
            .iter()
            .position(|s| s.name == to_inclusive)
            .ok_or_else(|| SnapshotError::Unknown(to_inclusive.to_string()))?;
        let from_idx = match from_exclusive {
            None => 0,
            Some(name) => {
                self.list
                    .snapshots
                    .iter()
                    .position(|s| s.name == name)
                    .ok_or_else(|| SnapshotError::Unknown(name.to_string()))?
                    + 1
            }
        };
        Ok(self.list.snapshots[from_idx..=to_idx]
            .iter()
            .flat_map(|s| s.tlogs.iter().copied())
            .collect())
    }

    /// Replace a snapshot's TLog list with the Scrubber's rewritten set
    /// (`TLogRewrite`, spec §4.6), and update the volume-wide scrub id
    /// (spec §4.4 Invariant 4: this must stay equal to MetaDataStore's).
    pub fn apply_tlog_rewrite(&mut self, name: &str, new_tlogs: Vec<Uuid>, scrub_id: u64) -> Result<(), SnapshotError> {
        self.find_mut(name)?.tlogs = new_tlogs;
        self.list.scrub_id = Some(scrub_id);
        Ok(())
    }

    pub fn scrub_id(&self) -> Option<u64> {
        self.list.scrub_id
    }

    pub fn snapshot_list(&self) -> &SnapshotList {
        &self.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_list_hides_deleted() {
        let mut mgmt = SnapshotManagement::new();
        mgmt.record_tlog(Uuid::new_v4());
        mgmt.create_snapshot("snap1", serde_json::Value::Null, Uuid::new_v4()).unwrap();
        mgmt.record_tlog(Uuid::new_v4());
        mgmt.create_snapshot("snap2", serde_json::Value::Null, Uuid::new_v4()).unwrap();
        assert_eq!(mgmt.list_snapshots().count(), 2);

        mgmt.delete_snapshot("snap1").unwrap();
        assert_eq!(mgmt.list_snapshots().count(), 1);
        // still addressable for scrub purposes until purged
        assert!(mgmt.get("snap1").is_ok());
    }

    #[test]
    fn restore_truncates_later_snapshots() {
        let mut mgmt = SnapshotManagement::new();
        mgmt.create_snapshot("a", serde_json::Value::Null, Uuid::new_v4()).unwrap();
        mgmt.create_snapshot("b", serde_json::Value::Null, Uuid::new_v4()).unwrap();
        mgmt.create_snapshot("c", serde_json::Value::Null, Uuid::new_v4()).unwrap();
        mgmt.restore_snapshot("a").unwrap();
        let names: Vec<_> = mgmt.list_snapshots().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[test]
    fn tlogs_in_range_covers_boundary() {
        let mut mgmt = SnapshotManagement::new();
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        mgmt.record_tlog(t1);
        mgmt.create_snapshot("a", serde_json::Value::Null, Uuid::new_v4()).unwrap();
        mgmt.record_tlog(t2);
        mgmt.create_snapshot("b", serde_json::Value::Null, Uuid::new_v4()).unwrap();

        assert_eq!(mgmt.tlogs_in_range(None, "a").unwrap(), vec![t1]);
        assert_eq!(mgmt.tlogs_in_range(Some("a"), "b").unwrap(), vec![t2]);
        assert_eq!(mgmt.tlogs_in_range(None, "b").unwrap(), vec![t1, t2]);
    }

    #[test]
    fn bytes_roundtrip() {
        let mut mgmt = SnapshotManagement::new();
        mgmt.create_snapshot("a", serde_json::json!({"note": "x"}), Uuid::new_v4())
            .unwrap();
        let bytes = mgmt.to_bytes().unwrap();
        let restored = SnapshotManagement::from_bytes(&bytes).unwrap();
        assert_eq!(restored.get("a").unwrap().name, "a");
    }
}
