use vd_backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum BackendTaskError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A prior task in `namespace` failed permanently and was never
    /// acknowledged; the queue refuses to proceed past it (spec §4.8:
    /// "refuses to proceed past a poisoned task until operator
    /// intervention").
    #[error("namespace {namespace} is poisoned by a failed task: {source}")]
    Poisoned { namespace: String, source: String },

    #[error("the task runner is shutting down")]
    ShuttingDown,
}
