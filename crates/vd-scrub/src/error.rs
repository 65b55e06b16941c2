use vd_backend::BackendError;
use vd_metadata::MetaDataStoreError;
use vd_snapshot::SnapshotError;

#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    MetaData(#[from] MetaDataStoreError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    /// A superseding scrub already recorded a newer `scrub_id` for this
    /// snapshot (spec §4.6: "applying an obsolete scrub... fails with
    /// ScrubIdMismatch").
    #[error("scrub result is obsolete: volume is already at scrub_id {current}, result is for {attempted}")]
    ScrubIdMismatch { current: u64, attempted: u64 },

    #[error("scrub result {scrub_result_name} belongs to namespace {actual}, not {expected}")]
    WrongNamespace {
        scrub_result_name: String,
        expected: String,
        actual: String,
    },
}
