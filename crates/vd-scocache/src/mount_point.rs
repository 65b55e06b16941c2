use std::path::PathBuf;

/// Index into `ScoCache`'s mount point list; stable for the lifetime of the
/// cache (mount points are never removed, only marked broken).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MountPointId(pub usize);

pub struct MountPoint {
    pub path: PathBuf,
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    pub broken: bool,
}

impl MountPoint {
    pub fn new(path: PathBuf, capacity_bytes: u64) -> Self {
        Self {
            path,
            capacity_bytes,
            used_bytes: 0,
            broken: false,
        }
    }

    pub fn free_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }
}
