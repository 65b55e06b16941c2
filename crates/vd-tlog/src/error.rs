use thiserror::Error;

#[derive(Debug, Error)]
pub enum TLogError {
    #[error("checksum mismatch in tlog record at record index {index}")]
    ChecksumMismatch { index: u64 },

    #[error("unknown tlog record tag {tag}")]
    UnknownTag { tag: u8 },

    #[error("tlog {0} already exists")]
    AlreadyExists(uuid::Uuid),

    #[error("tlog {0} not found")]
    NotFound(uuid::Uuid),

    #[error("tlog is already finalized and cannot be appended to")]
    Finalized,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
