use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;

use uuid::Uuid;

use super::TLogStorage;

/// `TLogStorage` backed by one file per TLog in a root directory, named per
/// spec §6 (`tlog_<uuid>`). Grounded on `commitlog::repo::fs::Fs`'s
/// create/open/remove shape.
#[derive(Clone)]
pub struct FsTLogStorage {
    root: PathBuf,
}

impl FsTLogStorage {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("tlog_{id}"))
    }
}

impl TLogStorage for FsTLogStorage {
    type File = File;

    fn create(&self, id: Uuid) -> io::Result<Self::File> {
        OpenOptions::new().create_new(true).write(true).read(true).open(self.path(id))
    }

    fn open(&self, id: Uuid) -> io::Result<Self::File> {
        OpenOptions::new().write(true).read(true).open(self.path(id))
    }

    fn remove(&self, id: Uuid) -> io::Result<()> {
        fs::remove_file(self.path(id))
    }

    fn existing(&self) -> io::Result<Vec<Uuid>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(rest) = name.strip_prefix("tlog_") {
                if let Ok(id) = Uuid::parse_str(rest) {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }
}
