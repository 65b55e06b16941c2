//! MetaDataStore: the logical-to-physical cluster map (spec §3, §4.4).
//!
//! Grounded on `core::db::datastore::locking_tx_datastore::datastore`'s
//! `Arc<parking_lot::RwLock<CommittedState>>` pattern for guarding shared
//! state cheaply under concurrent reads, generalized here to a paged LRU
//! cache in front of a pluggable persistent backend.

mod backend;
mod error;
mod page;
mod store;

pub use backend::{mem::InMemoryBackend, single_file::SingleFileBackend, MetaDataBackend};
pub use error::MetaDataStoreError;
pub use page::{Page, PageIndex, PAGE_SIZE};
pub use store::{MetaDataStore, MetaDataStoreBuilder, Relocation};
