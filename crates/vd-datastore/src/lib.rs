//! DataStore: the cluster allocator over the currently-open SCO (spec §4.2).
//!
//! Grounded on `commitlog::segment::Writer`: buffered append, seal-on-full,
//! a trailing checksum, narrowed from a segment of commits to an SCO of
//! fixed-size clusters.

mod datastore;
mod error;
mod sco;
pub mod storage;

pub use datastore::{Allocated, DataStore, SealedSco};
pub use error::DataStoreError;
pub use storage::{fs::FsScoStorage, mem::MemScoStorage, ScoStorage};
