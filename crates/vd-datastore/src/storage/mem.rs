use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use vd_core::{CloneId, SconId};

use super::{Durable, ScoStorage};

type Key = (u32, u8);

/// In-memory [`ScoStorage`], the `vd-datastore` analogue of
/// `vd_tlog::storage::mem::MemTLogStorage`: used by the volume driver's own
/// fast, deterministic tests.
#[derive(Clone, Default)]
pub struct MemScoStorage {
    files: Arc<Mutex<HashMap<Key, Vec<u8>>>>,
}

impl MemScoStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemFile {
    key: Key,
    store: Arc<Mutex<HashMap<Key, Vec<u8>>>>,
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
        self.store.lock().unwrap().insert(self.key, data);
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

impl ScoStorage for MemScoStorage {
    type File = MemFile;

    fn create(&self, sco: SconId, clone_id: CloneId) -> io::Result<Self::File> {
        let key = (sco.0, clone_id.0);
        let mut files = self.files.lock().unwrap();
        if files.contains_key(&key) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "sco exists"));
        }
        files.insert(key, Vec::new());
        Ok(MemFile {
            key,
            store: self.files.clone(),
            cursor: Cursor::new(Vec::new()),
        })
    }

    fn open(&self, sco: SconId, clone_id: CloneId) -> io::Result<Self::File> {
        let key = (sco.0, clone_id.0);
        let files = self.files.lock().unwrap();
        let data = files
            .get(&key)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "sco not found"))?
            .clone();
        Ok(MemFile {
            key,
            store: self.files.clone(),
            cursor: Cursor::new(data),
        })
    }

    fn remove(&self, sco: SconId, clone_id: CloneId) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .remove(&(sco.0, clone_id.0))
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "sco not found"))
    }
}
