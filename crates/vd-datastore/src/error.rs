use vd_core::ClusterLocation;
use vd_scocache::ScoCacheError;

#[derive(Debug, thiserror::Error)]
pub enum DataStoreError {
    #[error("cluster buffer has wrong size: expected {expected}, got {actual}")]
    BadClusterSize { expected: u64, actual: usize },

    #[error("open sco is full")]
    ScoFull,

    #[error("cluster location {0} not found in any open or sealed sco")]
    Unknown(ClusterLocation),

    #[error(transparent)]
    ScoCache(#[from] ScoCacheError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
