use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use vd_core::Weed;

use crate::{BackendError, BackendIface, BackendRequestParameters, ObjectMeta};

/// `BackendIface` backed by a directory tree: one subdirectory per namespace,
/// one file per object. Grounded on `commitlog::repo::fs::Fs`'s root-dir +
/// named-file layout, generalized from log segments to arbitrary objects.
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn ns_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace)
    }

    fn obj_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.ns_dir(namespace).join(name)
    }

    fn map_io_err(namespace: &str, name: &str, e: io::Error) -> BackendError {
        match e.kind() {
            io::ErrorKind::NotFound => BackendError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            io::ErrorKind::AlreadyExists => BackendError::AlreadyExists {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            _ => BackendError::Io(e),
        }
    }
}

impl BackendIface for LocalFs {
    fn put(
        &self,
        namespace: &str,
        name: &str,
        data: &[u8],
        overwrite: bool,
        _params: BackendRequestParameters,
    ) -> Result<(), BackendError> {
        if !self.ns_dir(namespace).is_dir() {
            return Err(BackendError::NamespaceGone(namespace.to_string()));
        }
        let path = self.obj_path(namespace, name);
        // Write to a temp file and rename, so a crash never leaves a
        // partially-written object visible (same atomicity requirement
        // commitlog places on `create_segment`).
        let tmp_path = path.with_extension("tmp");
        let mut tmp = File::create(&tmp_path).map_err(BackendError::Io)?;
        tmp.write_all(data).map_err(BackendError::Io)?;
        tmp.sync_all().map_err(BackendError::Io)?;
        if !overwrite && path.exists() {
            let _ = fs::remove_file(&tmp_path);
            return Err(BackendError::AlreadyExists {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        fs::rename(&tmp_path, &path).map_err(BackendError::Io)?;
        Ok(())
    }

    fn get(&self, namespace: &str, name: &str, _params: BackendRequestParameters) -> Result<Vec<u8>, BackendError> {
        let mut buf = Vec::new();
        File::open(self.obj_path(namespace, name))
            .map_err(|e| Self::map_io_err(namespace, name, e))?
            .read_to_end(&mut buf)
            .map_err(BackendError::Io)?;
        Ok(buf)
    }

    fn get_range(
        &self,
        namespace: &str,
        name: &str,
        offset: u64,
        len: u64,
        _params: BackendRequestParameters,
    ) -> Result<Vec<u8>, BackendError> {
        let mut file = File::open(self.obj_path(namespace, name)).map_err(|e| Self::map_io_err(namespace, name, e))?;
        file.seek(SeekFrom::Start(offset)).map_err(BackendError::Io)?;
        let mut buf = vec![0u8; len as usize];
        let n = file.read(&mut buf).map_err(BackendError::Io)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn delete(&self, namespace: &str, name: &str, _params: BackendRequestParameters) -> Result<(), BackendError> {
        fs::remove_file(self.obj_path(namespace, name)).map_err(|e| Self::map_io_err(namespace, name, e))
    }

    fn list(&self, namespace: &str, _params: BackendRequestParameters) -> Result<Vec<ObjectMeta>, BackendError> {
        let dir = self.ns_dir(namespace);
        if !dir.is_dir() {
            return Err(BackendError::NamespaceGone(namespace.to_string()));
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(BackendError::Io)? {
            let entry = entry.map_err(BackendError::Io)?;
            if entry.path().extension().map(|e| e == "tmp").unwrap_or(false) {
                continue;
            }
            let meta = entry.metadata().map_err(BackendError::Io)?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let data = self.get(namespace, &name, BackendRequestParameters::default())?;
            out.push(ObjectMeta {
                name,
                size: meta.len(),
                checksum: Some(Weed::of(&data)),
            });
        }
        Ok(out)
    }

    fn ensure_namespace(&self, namespace: &str) -> Result<(), BackendError> {
        fs::create_dir_all(self.ns_dir(namespace)).map_err(BackendError::Io)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn params() -> BackendRequestParameters {
        BackendRequestParameters::default()
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let be = LocalFs::new(dir.path()).unwrap();
        be.ensure_namespace("ns").unwrap();
        be.put("ns", "obj", b"hello", false, params()).unwrap();
        assert_eq!(be.get("ns", "obj", params()).unwrap(), b"hello");
        be.delete("ns", "obj", params()).unwrap();
        assert!(matches!(be.get("ns", "obj", params()), Err(BackendError::NotFound { .. })));
    }

    #[test]
    fn put_is_atomic_via_rename() {
        let dir = tempdir().unwrap();
        let be = LocalFs::new(dir.path()).unwrap();
        be.ensure_namespace("ns").unwrap();
        be.put("ns", "obj", b"v1", false, params()).unwrap();
        assert!(!dir.path().join("ns").join("obj.tmp").exists());
    }

    #[test]
    fn list_reports_sizes_and_checksums() {
        let dir = tempdir().unwrap();
        let be = LocalFs::new(dir.path()).unwrap();
        be.ensure_namespace("ns").unwrap();
        be.put("ns", "a", b"1234", false, params()).unwrap();
        let listed = be.list("ns", params()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, 4);
        assert_eq!(listed[0].checksum, Some(Weed::of(b"1234")));
    }
}
