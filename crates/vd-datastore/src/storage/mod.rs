use std::io::{Read, Seek, Write};

use vd_core::{CloneId, SconId};

pub mod fs;
pub mod mem;

/// A file-like handle that can be forced to stable storage, mirroring
/// `vd_tlog::storage::Durable` (spec §4.1 "Sync": "flush open SCO to disk").
pub trait Durable {
    fn sync_all(&mut self) -> std::io::Result<()>;
}

impl Durable for std::fs::File {
    fn sync_all(&mut self) -> std::io::Result<()> {
        std::fs::File::sync_all(self)
    }
}

/// Storage backing for SCO payload files, analogous to `vd_tlog::TLogStorage`
/// but keyed by `(SconId, CloneId)` and named per spec §6's
/// `<sconumber>_<cloneid>` object naming.
pub trait ScoStorage: Clone {
    type File: Read + Write + Seek + Send + Durable;

    /// Create a new, empty SCO file. Must fail with
    /// [`std::io::ErrorKind::AlreadyExists`] if one already exists.
    fn create(&self, sco: SconId, clone_id: CloneId) -> std::io::Result<Self::File>;

    fn open(&self, sco: SconId, clone_id: CloneId) -> std::io::Result<Self::File>;

    fn remove(&self, sco: SconId, clone_id: CloneId) -> std::io::Result<()>;
}
