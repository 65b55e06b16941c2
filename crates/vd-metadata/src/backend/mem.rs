use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::MetaDataStoreError;
use crate::page::{Page, PageIndex};

use super::MetaDataBackend;

/// In-memory `MetaDataBackend`, used for tests and for `MetaDataStoreBuilder`
/// when rebuilding into a scratch store.
#[derive(Default)]
pub struct InMemoryBackend {
    pages: Mutex<HashMap<PageIndex, Page>>,
    scrub_id: Mutex<Option<u64>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetaDataBackend for InMemoryBackend {
    fn load_page(&self, page: PageIndex) -> Result<Option<Page>, MetaDataStoreError> {
        Ok(self.pages.lock().get(&page).cloned())
    }

    fn store_page(&self, page: PageIndex, data: &Page) -> Result<(), MetaDataStoreError> {
        self.pages.lock().insert(page, data.clone());
        Ok(())
    }

    fn load_scrub_id(&self) -> Result<Option<u64>, MetaDataStoreError> {
        Ok(*self.scrub_id.lock())
    }

    fn store_scrub_id(&self, id: u64) -> Result<(), MetaDataStoreError> {
        *self.scrub_id.lock() = Some(id);
        Ok(())
    }
}
