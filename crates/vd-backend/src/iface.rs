use std::time::Duration;

use thiserror::Error;
use vd_core::Weed;

/// Errors a [`BackendIface`] implementation may return. Maps onto spec §7's
/// `BackendTransient`/`BackendPermanent` split: [`BackendError::Transient`] is
/// retried by callers (`BackendTaskRunner`, `GarbageCollector`); everything
/// else is permanent.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("object not found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },

    #[error("object already exists: {namespace}/{name}")]
    AlreadyExists { namespace: String, name: String },

    #[error("namespace vanished: {0}")]
    NamespaceGone(String),

    #[error("checksum mismatch for {namespace}/{name}")]
    ChecksumMismatch { namespace: String, name: String },

    #[error("transient backend error: {0}")]
    Transient(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// Retry/timeout knobs accepted by every `BackendIface` operation (spec §5).
#[derive(Clone, Copy, Debug)]
pub struct BackendRequestParameters {
    pub retries: u32,
    pub timeout: Duration,
}

impl Default for BackendRequestParameters {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Metadata about a stored object, as returned by `list`/`stat`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub name: String,
    pub size: u64,
    pub checksum: Option<Weed>,
}

/// Read/write/list/delete named objects within a namespace (spec §1, §4
/// "BackendIface"). A namespace roughly corresponds to one volume's lineage
/// level; object names are the ones enumerated in spec §6
/// (`volume_configuration`, `tlog_<uuid>`, `<sconumber>_<cloneid>`,
/// `scrub_result_<uuid>`, the snapshot list).
pub trait BackendIface: Send + Sync {
    /// Write `data` as `name` within `namespace`. If `overwrite` is `false`
    /// and the object already exists, returns
    /// [`BackendError::AlreadyExists`].
    fn put(
        &self,
        namespace: &str,
        name: &str,
        data: &[u8],
        overwrite: bool,
        params: BackendRequestParameters,
    ) -> Result<(), BackendError>;

    /// Read the full contents of `name` within `namespace`.
    fn get(&self, namespace: &str, name: &str, params: BackendRequestParameters) -> Result<Vec<u8>, BackendError>;

    /// Read `len` bytes starting at `offset` within `name` (used for partial
    /// SCO fetches, spec §4.1 read step 4).
    fn get_range(
        &self,
        namespace: &str,
        name: &str,
        offset: u64,
        len: u64,
        params: BackendRequestParameters,
    ) -> Result<Vec<u8>, BackendError>;

    fn delete(&self, namespace: &str, name: &str, params: BackendRequestParameters) -> Result<(), BackendError>;

    /// Best-effort; a backend that doesn't find `name` returns `Ok(())`,
    /// matching the idempotent-delete contract GarbageCollector relies on.
    fn delete_best_effort(&self, namespace: &str, name: &str, params: BackendRequestParameters) {
        match self.delete(namespace, name, params) {
            Ok(()) | Err(BackendError::NotFound { .. }) => {}
            Err(e) => log::warn!("best-effort delete of {namespace}/{name} failed: {e}"),
        }
    }

    fn list(&self, namespace: &str, params: BackendRequestParameters) -> Result<Vec<ObjectMeta>, BackendError>;

    fn exists(&self, namespace: &str, name: &str, params: BackendRequestParameters) -> Result<bool, BackendError> {
        match self.get(namespace, name, params) {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create `namespace` if the backend requires explicit namespace
    /// creation; a no-op for backends that create namespaces implicitly.
    fn ensure_namespace(&self, namespace: &str) -> Result<(), BackendError>;
}
