use crate::error::MetaDataStoreError;
use crate::page::{Page, PageIndex};

pub mod mem;
pub mod single_file;

/// Pluggable persistent backend for the metadata store (spec §4.4:
/// "TokyoCabinet-style local, or MDS (remote RocksDB service)"). The core
/// only depends on this trait; a real remote-MDS client is out of scope
/// (spec §1), represented here by [`mem::InMemoryBackend`] and
/// [`single_file::SingleFileBackend`] as reference implementations.
pub trait MetaDataBackend: Send + Sync {
    fn load_page(&self, page: PageIndex) -> Result<Option<Page>, MetaDataStoreError>;
    fn store_page(&self, page: PageIndex, data: &Page) -> Result<(), MetaDataStoreError>;

    fn load_scrub_id(&self) -> Result<Option<u64>, MetaDataStoreError>;
    fn store_scrub_id(&self, id: u64) -> Result<(), MetaDataStoreError>;
}
