use std::io::{Read, Seek, Write};

use uuid::Uuid;

pub mod fs;
pub mod mem;

/// A file-like handle that can be forced to stable storage. Required so
/// `TLogWriter::sync` can honor Invariant 3 / the `sync()` happens-before
/// guarantee (spec §5) independent of the storage backend.
pub trait Durable {
    fn sync_all(&mut self) -> std::io::Result<()>;
}

impl Durable for std::fs::File {
    fn sync_all(&mut self) -> std::io::Result<()> {
        std::fs::File::sync_all(self)
    }
}

/// Storage backing for TLogs, analogous to `commitlog::repo::Repo` but keyed
/// by the TLog's UUID rather than a segment offset (spec §3: "Identified by
/// a UUID").
pub trait TLogStorage: Clone {
    type File: Read + Write + Seek + Send + Durable;

    /// Create a new, empty TLog file for `id`. Must fail with
    /// [`std::io::ErrorKind::AlreadyExists`] if one already exists.
    fn create(&self, id: Uuid) -> std::io::Result<Self::File>;

    /// Open an existing TLog file for reading (and, for resuming a write
    /// after a restart, appending).
    fn open(&self, id: Uuid) -> std::io::Result<Self::File>;

    fn remove(&self, id: Uuid) -> std::io::Result<()>;

    fn existing(&self) -> std::io::Result<Vec<Uuid>>;
}
