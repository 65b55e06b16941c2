mod cache;
mod error;
mod mount_point;
mod sco;

pub use cache::{Cleaner, FillBand, ScoCache};
pub use error::ScoCacheError;
pub use mount_point::{MountPoint, MountPointId};
pub use sco::{ScoClass, ScoEntry, ScoKey};
