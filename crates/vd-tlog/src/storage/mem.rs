use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::{Durable, TLogStorage};

/// In-memory [`TLogStorage`], the `vd-tlog` analogue of
/// `commitlog::repo::mem::Memory`: used by the volume driver's own fast,
/// deterministic tests.
#[derive(Clone, Default)]
pub struct MemTLogStorage {
    files: Arc<Mutex<HashMap<Uuid, Vec<u8>>>>,
}

impl MemTLogStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A handle into [`MemTLogStorage`]: reads/writes/seeks against a shared
/// in-memory buffer, flushing back to the map on every write so concurrent
/// openers observe appended data (TLogs have exactly one writer in practice).
pub struct MemFile {
    id: Uuid,
    store: Arc<Mutex<HashMap<Uuid, Vec<u8>>>>,
    cursor: Cursor<Vec<u8>>,
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.cursor.write(buf)?;
        let pos = self.cursor.position();
        let data = self.cursor.get_ref().clone();
        self.store.lock().unwrap().insert(self.id, data);
        self.cursor.set_position(pos);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl Durable for MemFile {
    fn sync_all(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl TLogStorage for MemTLogStorage {
    type File = MemFile;

    fn create(&self, id: Uuid) -> io::Result<Self::File> {
        let mut files = self.files.lock().unwrap();
        if files.contains_key(&id) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "tlog exists"));
        }
        files.insert(id, Vec::new());
        Ok(MemFile {
            id,
            store: self.files.clone(),
            cursor: Cursor::new(Vec::new()),
        })
    }

    fn open(&self, id: Uuid) -> io::Result<Self::File> {
        let files = self.files.lock().unwrap();
        let data = files
            .get(&id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "tlog not found"))?
            .clone();
        Ok(MemFile {
            id,
            store: self.files.clone(),
            cursor: Cursor::new(data),
        })
    }

    fn remove(&self, id: Uuid) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "tlog not found"))
    }

    fn existing(&self) -> io::Result<Vec<Uuid>> {
        Ok(self.files.lock().unwrap().keys().copied().collect())
    }
}
