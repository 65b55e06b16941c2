use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unknown snapshot: {0}")]
    Unknown(String),

    #[error("snapshot already exists: {0}")]
    AlreadyExists(String),

    #[error("snapshot {0} was deleted")]
    Deleted(String),

    #[error("failed to (de)serialize snapshot list: {0}")]
    Serde(#[from] serde_json::Error),
}
