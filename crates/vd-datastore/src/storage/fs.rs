use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;

use vd_core::{CloneId, SconId};

use super::ScoStorage;

/// `ScoStorage` backed by one file per SCO in a root directory, named per
/// spec §6 (`<sconumber>_<cloneid>`). Grounded on `commitlog::repo::fs::Fs`'s
/// create/open/remove shape, the same way `vd_tlog::storage::fs` is.
#[derive(Clone)]
pub struct FsScoStorage {
    root: PathBuf,
}

impl FsScoStorage {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path(&self, sco: SconId, clone_id: CloneId) -> PathBuf {
        self.root.join(format!("{sco}_{}", clone_id.0))
    }
}

impl ScoStorage for FsScoStorage {
    type File = File;

    fn create(&self, sco: SconId, clone_id: CloneId) -> io::Result<Self::File> {
        OpenOptions::new()
            .create_new(true)
            .write(true)
            .read(true)
            .open(self.path(sco, clone_id))
    }

    fn open(&self, sco: SconId, clone_id: CloneId) -> io::Result<Self::File> {
        OpenOptions::new().write(true).read(true).open(self.path(sco, clone_id))
    }

    fn remove(&self, sco: SconId, clone_id: CloneId) -> io::Result<()> {
        fs::remove_file(self.path(sco, clone_id))
    }
}
