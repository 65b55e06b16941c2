//! `Volume` re-uses [`vd_core::VolumeError`] as its public error type (spec
//! §7). Each component crate keeps its own narrower error enum for its own
//! callers and tests; `Volume` converts at the boundary it owns, the way
//! spec §7 "Propagation" describes: only permanent or invariant-breaking
//! errors propagate, so conversion (not `?`-transparent passthrough) is the
//! right seam here rather than a blanket `From` impl.

use vd_core::VolumeError;

pub(crate) fn from_datastore(e: vd_datastore::DataStoreError) -> VolumeError {
    use vd_datastore::DataStoreError as E;
    match e {
        E::Unknown(loc) => VolumeError::Halting(format!("datastore: cluster location {loc} not found")),
        E::ScoFull => VolumeError::Halting("datastore: allocate called on a full sco".to_string()),
        E::BadClusterSize { expected, actual } => {
            VolumeError::InvalidArgument(format!("cluster size mismatch: expected {expected}, got {actual}"))
        }
        E::ScoCache(inner) => VolumeError::Halting(format!("scocache: {inner}")),
        E::Io(io) => VolumeError::Io(io),
    }
}

pub(crate) fn from_tlog(e: vd_tlog::TLogError) -> VolumeError {
    VolumeError::Halting(format!("tlog: {e}"))
}

pub(crate) fn from_metadata(e: vd_metadata::MetaDataStoreError) -> VolumeError {
    use vd_metadata::MetaDataStoreError as E;
    match e {
        E::Corrupt(msg) => VolumeError::MetaDataStoreCorrupt(msg),
        other => VolumeError::Halting(format!("metadata store: {other}")),
    }
}

pub(crate) fn from_failover(e: vd_failover::FailOverError) -> VolumeError {
    VolumeError::FailOverCache(e.to_string())
}

pub(crate) fn from_snapshot(e: vd_snapshot::SnapshotError) -> VolumeError {
    use vd_snapshot::SnapshotError as E;
    match e {
        E::Unknown(name) | E::Deleted(name) => VolumeError::UnknownSnapshot(name),
        other => VolumeError::InvalidArgument(other.to_string()),
    }
}

pub(crate) fn from_scrub(e: vd_scrub::ScrubError) -> VolumeError {
    use vd_scrub::ScrubError as E;
    match e {
        E::ScrubIdMismatch { current, attempted } => VolumeError::ScrubIdMismatch {
            current: Some(current),
            reply: Some(attempted),
        },
        E::Snapshot(inner) => from_snapshot(inner),
        E::MetaData(inner) => from_metadata(inner),
        other => VolumeError::BackendPermanent(other.to_string()),
    }
}

pub(crate) fn from_backend(e: vd_backend::BackendError) -> VolumeError {
    if e.is_transient() {
        VolumeError::BackendTransient(e.to_string())
    } else {
        VolumeError::BackendPermanent(e.to_string())
    }
}

pub(crate) fn from_backend_task(e: vd_backend_tasks::BackendTaskError) -> VolumeError {
    use vd_backend_tasks::BackendTaskError as E;
    match e {
        E::Backend(inner) => from_backend(inner),
        E::Poisoned { namespace, source } => {
            VolumeError::Halting(format!("backend task queue for {namespace} is poisoned: {source}"))
        }
        E::ShuttingDown => VolumeError::Halting("backend task runner is shutting down".to_string()),
    }
}
