//! Volume: the orchestrator exposing the read/write/sync/snapshot API and
//! owning lock/ordering discipline across every other component (spec
//! §4.1).
//!
//! Grounded on `core::db::datastore::locking_tx_datastore::datastore`'s
//! `write_lock`/`rwlock` pair and lock-order discipline, and on
//! `commitlog.rs`'s halt-on-invariant-breach pattern; ties together every
//! other `vd-*` crate the way `core::RelationalDB` ties together its own
//! datastore/durability/subscription subsystems.

mod cluster_cache;
mod config;
mod error;
mod parent;
mod state;
mod volume;

pub use cluster_cache::ClusterCache;
pub use config::FailOverCacheConfig;
pub use parent::ParentLookup;
pub use state::VolumeFailOverState;
pub use volume::{Volume, VolumeHandles};
