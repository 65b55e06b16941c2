use vd_backend::{BackendIface, BackendRequestParameters};
use vd_core::CloneId;
use vd_gc::{Garbage, GarbageCollector};
use vd_metadata::MetaDataStore;
use vd_snapshot::SnapshotManagement;

use crate::error::ScrubError;
use crate::work::{ScrubReply, ScrubResultPayload};

/// Apply a scrub result in the volume process (spec §4.6 "Apply"):
/// validates the reply belongs to `namespace` and that the volume's current
/// `scrub_id` isn't already at or past `new_scrub_id`, updates
/// [`SnapshotManagement`] to point the snapshot at the new TLogs, calls
/// [`MetaDataStore::apply_relocations`], and on success enqueues the result's
/// garbage to `gc`.
///
/// Applying the same `scrub_id` twice is a no-op; applying one older than
/// the volume's current `scrub_id` fails with [`ScrubError::ScrubIdMismatch`].
pub fn apply_scrub_reply(
    backend: &impl BackendIface,
    params: BackendRequestParameters,
    namespace: &str,
    reply: &ScrubReply,
    new_scrub_id: u64,
    clone_id: CloneId,
    snapshots: &mut SnapshotManagement,
    metadata: &MetaDataStore,
    gc: &GarbageCollector,
) -> Result<(), ScrubError> {
    if reply.namespace != namespace {
        return Err(ScrubError::WrongNamespace {
            scrub_result_name: reply.scrub_result_name.clone(),
            expected: namespace.to_string(),
            actual: reply.namespace.clone(),
        });
    }

    // Confirms the snapshot exists; propagates SnapshotError::Unknown if not.
    snapshots.get(&reply.snapshot_name)?;

    if let Some(current) = snapshots.scrub_id() {
        if current == new_scrub_id {
            log::debug!("apply_scrub_reply: scrub_id {new_scrub_id} already applied, no-op");
            return Ok(());
        }
        if current > new_scrub_id {
            return Err(ScrubError::ScrubIdMismatch {
                current,
                attempted: new_scrub_id,
            });
        }
    }

    let bytes = backend.get(&reply.namespace, &reply.scrub_result_name, params)?;
    let payload: ScrubResultPayload = serde_json::from_slice(&bytes)?;

    snapshots.apply_tlog_rewrite(&reply.snapshot_name, payload.tlog_rewrite.new_tlogs.clone(), new_scrub_id)?;
    metadata.apply_relocations(payload.relocations.clone(), clone_id, new_scrub_id)?;

    if !payload.garbage.is_empty() {
        gc.queue(Garbage {
            namespace: reply.namespace.clone(),
            names: payload.garbage.clone(),
        });
    }

    log::info!(
        "apply_scrub_reply: applied scrub_id {new_scrub_id} to {}/{}",
        reply.namespace,
        reply.snapshot_name
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;
    use vd_backend::mem::Memory;
    use vd_backend::BackendIface;
    use vd_core::{ClusterAddress, CloneId, SconId};
    use vd_gc::GarbageCollector;
    use vd_metadata::{MetaDataStore, Relocation};

    use super::*;
    use crate::work::{ScrubResultPayload, TLogRewrite};

    fn loc(n: u32) -> vd_core::ClusterLocation {
        vd_core::ClusterLocation::new(SconId(n), CloneId(0), 0)
    }

    fn setup(namespace: &str) -> (Arc<Memory>, MetaDataStore, SnapshotManagement, GarbageCollector) {
        let backend = Arc::new(Memory::new());
        backend.ensure_namespace(namespace).unwrap();
        let metadata = MetaDataStore::new(Arc::new(vd_metadata::InMemoryBackend::new()), 8).unwrap();
        let mut snapshots = SnapshotManagement::new();
        snapshots.record_tlog(Uuid::new_v4());
        snapshots.create_snapshot("snap1", serde_json::Value::Null, Uuid::new_v4()).unwrap();
        let gc = GarbageCollector::spawn(backend.clone(), BackendRequestParameters::default(), 1);
        (backend, metadata, snapshots, gc)
    }

    fn publish_reply(backend: &Memory, namespace: &str, payload: &ScrubResultPayload) -> ScrubReply {
        let name = format!("scrub_result_{}", Uuid::new_v4());
        let bytes = serde_json::to_vec(payload).unwrap();
        backend.put(namespace, &name, &bytes, false, BackendRequestParameters::default()).unwrap();
        ScrubReply {
            namespace: namespace.to_string(),
            snapshot_name: "snap1".to_string(),
            scrub_result_name: name,
        }
    }

    #[test]
    fn apply_relocates_and_queues_garbage_then_is_idempotent() {
        let (backend, metadata, mut snapshots, gc) = setup("ns0");
        metadata.set(ClusterAddress(1), (loc(1), vd_core::Weed::of(b"x"))).unwrap();

        let payload = ScrubResultPayload {
            version: 2,
            relocations: vec![Relocation {
                ca: ClusterAddress(1),
                old_location: loc(1),
                new_location: loc(99),
            }],
            tlog_rewrite: TLogRewrite {
                snapshot_name: "snap1".to_string(),
                new_tlogs: vec![Uuid::new_v4()],
            },
            garbage: vec!["0000000001_0".to_string()],
        };
        backend.put("ns0", "0000000001_0", b"stale", false, BackendRequestParameters::default()).unwrap();
        let reply = publish_reply(&backend, "ns0", &payload);

        apply_scrub_reply(
            backend.as_ref(),
            BackendRequestParameters::default(),
            "ns0",
            &reply,
            7,
            CloneId(0),
            &mut snapshots,
            &metadata,
            &gc,
        )
        .unwrap();

        assert_eq!(metadata.get(ClusterAddress(1)).unwrap().unwrap().0, loc(99));
        assert_eq!(snapshots.get("snap1").unwrap().tlogs, payload.tlog_rewrite.new_tlogs);
        assert_eq!(snapshots.scrub_id(), Some(7));
        assert!(gc.barrier("ns0"));
        assert!(backend.get("ns0", "0000000001_0", BackendRequestParameters::default()).is_err());

        // Re-applying the same scrub_id is a no-op: doesn't error, doesn't
        // touch state that a second relocation plan (with stale
        // old_locations) would otherwise clobber.
        apply_scrub_reply(
            backend.as_ref(),
            BackendRequestParameters::default(),
            "ns0",
            &reply,
            7,
            CloneId(0),
            &mut snapshots,
            &metadata,
            &gc,
        )
        .unwrap();
        assert_eq!(metadata.get(ClusterAddress(1)).unwrap().unwrap().0, loc(99));

        gc.shutdown();
    }

    #[test]
    fn applying_obsolete_scrub_fails_with_mismatch() {
        let (backend, metadata, mut snapshots, gc) = setup("ns0");
        let payload = ScrubResultPayload {
            version: 2,
            relocations: vec![],
            tlog_rewrite: TLogRewrite {
                snapshot_name: "snap1".to_string(),
                new_tlogs: vec![],
            },
            garbage: vec![],
        };
        let reply = publish_reply(&backend, "ns0", &payload);

        apply_scrub_reply(
            backend.as_ref(),
            BackendRequestParameters::default(),
            "ns0",
            &reply,
            10,
            CloneId(0),
            &mut snapshots,
            &metadata,
            &gc,
        )
        .unwrap();

        let stale_reply = publish_reply(&backend, "ns0", &payload);
        let err = apply_scrub_reply(
            backend.as_ref(),
            BackendRequestParameters::default(),
            "ns0",
            &stale_reply,
            5,
            CloneId(0),
            &mut snapshots,
            &metadata,
            &gc,
        )
        .unwrap_err();
        assert!(matches!(err, ScrubError::ScrubIdMismatch { current: 10, attempted: 5 }));
        gc.shutdown();
    }

    #[test]
    fn wrong_namespace_is_rejected() {
        let (backend, metadata, mut snapshots, gc) = setup("ns0");
        let payload = ScrubResultPayload {
            version: 2,
            relocations: vec![],
            tlog_rewrite: TLogRewrite {
                snapshot_name: "snap1".to_string(),
                new_tlogs: vec![],
            },
            garbage: vec![],
        };
        let mut reply = publish_reply(&backend, "ns0", &payload);
        reply.namespace = "other-ns".to_string();

        let err = apply_scrub_reply(
            backend.as_ref(),
            BackendRequestParameters::default(),
            "ns0",
            &reply,
            1,
            CloneId(0),
            &mut snapshots,
            &metadata,
            &gc,
        )
        .unwrap_err();
        assert!(matches!(err, ScrubError::WrongNamespace { .. }));
        gc.shutdown();
    }
}
