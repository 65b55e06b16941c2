use thiserror::Error;

use crate::ClusterAddress;

/// Cross-cutting error taxonomy (spec §7). Component crates define their own
/// narrower error enums and convert into this one at the boundary with
/// `Volume`, so a precise local type is still available to component-level
/// callers and tests.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// Bad alignment, bad length, unknown snapshot, empty id, wrong owner tag.
    /// Reported to the caller, never retried.
    #[error("invalid alignment: lba={lba} must be a multiple of cluster_multiplier={cluster_multiplier}")]
    InvalidAlignment { lba: u64, cluster_multiplier: u32 },

    #[error("invalid length: len={len} must be a positive multiple of cluster_size={cluster_size}")]
    InvalidLength { len: u64, cluster_size: u64 },

    #[error("unknown snapshot: {0}")]
    UnknownSnapshot(String),

    #[error("wrong owner tag: have={have:?} given={given:?}")]
    WrongOwnerTag {
        have: crate::OwnerTag,
        given: crate::OwnerTag,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Timeout / 5xx-like backend error. Retried with backoff by
    /// BackendTaskRunner/GarbageCollector before it is ever surfaced here.
    #[error("transient backend error: {0}")]
    BackendTransient(String),

    /// Object not found when required, namespace vanished, checksum mismatch.
    /// Fatal to the specific operation.
    #[error("permanent backend error: {0}")]
    BackendPermanent(String),

    /// The FailOverCache bridge degraded; the write still succeeded locally.
    #[error("failover cache error (volume degraded): {0}")]
    FailOverCache(String),

    /// Invariant breach (TLog write failure, DataStore corruption): the
    /// volume is now halted and will reject further I/O.
    #[error("halting error, volume is now halted: {0}")]
    Halting(String),

    #[error("volume is halted")]
    Halted,

    /// Scrub apply failures: retry only after a fresh `ScrubWork` is
    /// recomputed.
    #[error("scrub id mismatch: volume has {current:?}, reply targets {reply:?}")]
    ScrubIdMismatch { current: Option<u64>, reply: Option<u64> },

    #[error("snapshot gone: {0}")]
    SnapshotGone(String),

    #[error("metadata store corrupt: {0}")]
    MetaDataStoreCorrupt(String),

    #[error("cluster address {0} out of range for this volume")]
    OutOfRange(ClusterAddress),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VolumeError {
    /// Whether this error class is safe to retry unchanged (spec §7:
    /// only `BackendTransient` is retried by callers above the component
    /// that already retries internally).
    pub fn is_transient(&self) -> bool {
        matches!(self, VolumeError::BackendTransient(_))
    }

    pub fn is_halting(&self) -> bool {
        matches!(self, VolumeError::Halting(_) | VolumeError::Halted)
    }
}
