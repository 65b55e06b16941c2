use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaDataStoreError {
    #[error("no cork is currently open")]
    NoOpenCork,

    #[error("uncork called with {given} but {open} is open")]
    CorkMismatch { open: uuid::Uuid, given: uuid::Uuid },

    #[error("metadata store corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
