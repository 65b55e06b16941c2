#[derive(Debug, thiserror::Error)]
pub enum FailOverError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote responded NotOk")]
    NotOk,

    #[error("malformed frame: {0}")]
    Protocol(String),

    #[error("all entries in one AddEntries must belong to the same SCO")]
    MixedSco,

    #[error("bridge is degraded; call setFailOverCacheConfig to re-arm")]
    Degraded,
}
