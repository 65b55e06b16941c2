use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::MetaDataStoreError;
use crate::page::{Page, PageIndex, PAGE_SIZE};

use super::MetaDataBackend;

const PAGE_RECORD_LEN: u64 = PAGE_SIZE * (1 + 4 + 1 + 1 + 16);

/// `MetaDataBackend` over a single sparse file of fixed-size page slots,
/// addressed by `page_index * PAGE_RECORD_LEN` -- the "TokyoCabinet-style
/// local" backend named in spec §4.4, without pulling in an actual
/// TokyoCabinet binding.
pub struct SingleFileBackend {
    pages_file: Mutex<File>,
    scrub_id_path: PathBuf,
}

impl SingleFileBackend {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, MetaDataStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let pages_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dir.join("pages.db"))?;
        Ok(Self {
            pages_file: Mutex::new(pages_file),
            scrub_id_path: dir.join("scrub_id"),
        })
    }
}

impl MetaDataBackend for SingleFileBackend {
    fn load_page(&self, page: PageIndex) -> Result<Option<Page>, MetaDataStoreError> {
        let mut file = self.pages_file.lock();
        let offset = page * PAGE_RECORD_LEN;
        if offset + PAGE_RECORD_LEN > file.metadata()?.len() {
            return Ok(None);
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; PAGE_RECORD_LEN as usize];
        file.read_exact(&mut buf)?;
        if buf.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        Ok(Some(Page::from_bytes(&buf)))
    }

    fn store_page(&self, page: PageIndex, data: &Page) -> Result<(), MetaDataStoreError> {
        let mut file = self.pages_file.lock();
        let offset = page * PAGE_RECORD_LEN;
        file.seek(SeekFrom::Start(offset))?;
        let bytes = data.to_bytes();
        debug_assert_eq!(bytes.len() as u64, PAGE_RECORD_LEN);
        file.write_all(&bytes)?;
        file.sync_data()?;
        Ok(())
    }

    fn load_scrub_id(&self) -> Result<Option<u64>, MetaDataStoreError> {
        match fs::read(&self.scrub_id_path) {
            Ok(bytes) if bytes.len() == 8 => Ok(Some(u64::from_le_bytes(bytes.try_into().unwrap()))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store_scrub_id(&self, id: u64) -> Result<(), MetaDataStoreError> {
        let tmp = self.scrub_id_path.with_extension("tmp");
        fs::write(&tmp, id.to_le_bytes())?;
        fs::rename(&tmp, &self.scrub_id_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use vd_core::{ClusterLocation, CloneId, SconId, Weed};

    use super::*;

    #[test]
    fn page_and_scrub_id_roundtrip() {
        let dir = tempdir().unwrap();
        let be = SingleFileBackend::open(dir.path()).unwrap();

        assert!(be.load_page(0).unwrap().is_none());
        assert_eq!(be.load_scrub_id().unwrap(), None);

        let mut page = Page::empty();
        page.set(2, Some((ClusterLocation::new(SconId(4), CloneId(0), 1), Weed::of(b"x"))));
        be.store_page(0, &page).unwrap();
        let loaded = be.load_page(0).unwrap().unwrap();
        assert_eq!(loaded.get(2), page.get(2));

        be.store_scrub_id(7).unwrap();
        assert_eq!(be.load_scrub_id().unwrap(), Some(7));
    }
}
