//! `BackendIface`: the object-backend abstraction (spec §1, §6). Out of scope
//! per spec is the real S3/Alba driver; this crate only specifies the trait
//! and two reference implementations used for tests and small deployments.

mod iface;
pub mod mem;
pub mod local_fs;
pub mod retry;

pub use iface::{BackendError, BackendIface, BackendRequestParameters, ObjectMeta};
pub use retry::with_retry;
