use vd_core::{CloneId, SconId};

#[derive(Debug, thiserror::Error)]
pub enum ScoCacheError {
    #[error("no mount point available with sufficient free space")]
    NoMountPoint,

    #[error("mount point {0} is broken")]
    MountPointBroken(usize),

    #[error("sco {0}_{1:?} unknown to the cache")]
    Unknown(SconId, CloneId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
