//! Shared primitives used across the volume driver core: cluster addressing,
//! physical locations, content hashes, volume configuration and the
//! cross-cutting error taxonomy (spec §7).

pub mod config;
pub mod error;
pub mod hash;
pub mod location;
pub mod owner;

pub use config::{ClusterCacheMode, NsidMap, VolumeConfig};
pub use error::VolumeError;
pub use hash::Weed;
pub use location::{ClusterAddress, ClusterLocation, CloneId, Lba, SconId};
pub use owner::OwnerTag;

/// A 512-byte sector, the smallest addressable unit beneath a [`ClusterAddress`].
pub const SECTOR_SIZE: u64 = 512;
