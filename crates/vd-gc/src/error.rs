use vd_backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("the collector is shutting down")]
    ShuttingDown,
}
