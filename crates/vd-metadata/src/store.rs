use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vd_core::{ClusterAddress, ClusterLocation, CloneId, Weed};

use crate::backend::MetaDataBackend;
use crate::error::MetaDataStoreError;
use crate::page::{page_of, Page, PageIndex};

/// One entry of a scrub's relocation log (spec §4.6 `RelocationLog`):
/// a cluster moved from `old_location` to `new_location`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Relocation {
    pub ca: ClusterAddress,
    pub old_location: ClusterLocation,
    pub new_location: ClusterLocation,
}

struct Lru {
    pages: HashMap<PageIndex, Page>,
    order: VecDeque<PageIndex>,
    capacity: usize,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self {
            pages: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn touch(&mut self, idx: PageIndex) {
        if let Some(pos) = self.order.iter().position(|i| *i == idx) {
            self.order.remove(pos);
        }
        self.order.push_back(idx);
    }

    fn get(&mut self, idx: PageIndex) -> Option<&Page> {
        if self.pages.contains_key(&idx) {
            self.touch(idx);
        }
        self.pages.get(&idx)
    }

    fn get_mut(&mut self, idx: PageIndex) -> Option<&mut Page> {
        if self.pages.contains_key(&idx) {
            self.touch(idx);
        }
        self.pages.get_mut(&idx)
    }

    /// Insert `page`, evicting the least-recently-used entry if at capacity.
    /// Returns the evicted (index, page) if it was dirty and needs a
    /// write-back before being dropped.
    fn insert(&mut self, idx: PageIndex, page: Page) -> Option<(PageIndex, Page)> {
        let evicted = if self.pages.len() >= self.capacity && !self.pages.contains_key(&idx) {
            self.order.pop_front().and_then(|lru_idx| self.pages.remove(&lru_idx).map(|p| (lru_idx, p)))
        } else {
            None
        };
        self.pages.insert(idx, page);
        self.touch(idx);
        evicted
    }

    fn dirty_pages(&self) -> Vec<PageIndex> {
        self.pages.iter().filter(|(_, p)| p.dirty).map(|(i, _)| *i).collect()
    }
}

/// Logical cluster address to physical location map (spec §4.4). Reads and
/// writes go through a bounded LRU of pages; the persistent backend is
/// consulted (and the result cached) on a miss, and dirty pages are only
/// written back at a `cork`/`unCorkAndTrySync` boundary (spec §4.4: "a
/// group-commit boundary aligned with TLog").
pub struct MetaDataStore {
    backend: Arc<dyn MetaDataBackend>,
    cache: RwLock<Lru>,
    open_cork: RwLock<Option<Uuid>>,
    scrub_id: RwLock<Option<u64>>,
}

impl MetaDataStore {
    pub fn new(backend: Arc<dyn MetaDataBackend>, max_cached_pages: usize) -> Result<Self, MetaDataStoreError> {
        let scrub_id = backend.load_scrub_id()?;
        Ok(Self {
            backend,
            cache: RwLock::new(Lru::new(max_cached_pages.max(1))),
            open_cork: RwLock::new(None),
            scrub_id: RwLock::new(scrub_id),
        })
    }

    pub fn get(&self, ca: ClusterAddress) -> Result<Option<(ClusterLocation, Weed)>, MetaDataStoreError> {
        let (page_idx, offset) = page_of(ca.0);
        {
            let mut cache = self.cache.write();
            if let Some(page) = cache.get(page_idx) {
                return Ok(page.get(offset));
            }
        }
        let page = self.backend.load_page(page_idx)?.unwrap_or_else(Page::empty);
        let value = page.get(offset);
        self.admit(page_idx, page)?;
        Ok(value)
    }

    pub fn set(&self, ca: ClusterAddress, value: (ClusterLocation, Weed)) -> Result<(), MetaDataStoreError> {
        let (page_idx, offset) = page_of(ca.0);
        let mut cache = self.cache.write();
        if let Some(page) = cache.get_mut(page_idx) {
            page.set(offset, Some(value));
            return Ok(());
        }
        drop(cache);
        let mut page = self.backend.load_page(page_idx)?.unwrap_or_else(Page::empty);
        page.set(offset, Some(value));
        self.admit(page_idx, page)?;
        Ok(())
    }

    fn admit(&self, idx: PageIndex, page: Page) -> Result<(), MetaDataStoreError> {
        let evicted = self.cache.write().insert(idx, page);
        if let Some((evicted_idx, evicted_page)) = evicted {
            if evicted_page.dirty {
                self.backend.store_page(evicted_idx, &evicted_page)?;
            }
        }
        Ok(())
    }

    /// Open a group-commit boundary; must be matched by
    /// [`Self::un_cork_and_try_sync`] with the same `id` (spec §4.4).
    pub fn cork(&self, id: Uuid) {
        *self.open_cork.write() = Some(id);
    }

    /// Close the open cork and flush every dirty page to the persistent
    /// backend. Returns an error if `id` doesn't match the currently open
    /// cork.
    pub fn un_cork_and_try_sync(&self, id: Uuid) -> Result<(), MetaDataStoreError> {
        let mut open = self.open_cork.write();
        match *open {
            None => return Err(MetaDataStoreError::NoOpenCork),
            Some(open_id) if open_id != id => {
                return Err(MetaDataStoreError::CorkMismatch { open: open_id, given: id })
            }
            _ => {}
        }
        let dirty = self.cache.read().dirty_pages();
        for idx in dirty {
            let mut cache = self.cache.write();
            if let Some(page) = cache.get_mut(idx) {
                let snapshot = page.clone();
                page.dirty = false;
                drop(cache);
                self.backend.store_page(idx, &snapshot)?;
            }
        }
        *open = None;
        Ok(())
    }

    pub fn scrub_id(&self) -> Option<u64> {
        *self.scrub_id.read()
    }

    /// Apply a scrub's relocations idempotently (spec §4.4 "apply_relocations
    /// semantics"). `_clone_id` is accepted for interface symmetry with the
    /// volume/clone the relocations were computed for; relocations only ever
    /// touch this store's own CAs.
    pub fn apply_relocations(
        &self,
        relocations: impl IntoIterator<Item = Relocation>,
        _clone_id: CloneId,
        new_scrub_id: u64,
    ) -> Result<(), MetaDataStoreError> {
        if self.scrub_id() == Some(new_scrub_id) {
            log::debug!("apply_relocations: scrub_id {new_scrub_id} already applied, no-op");
            return Ok(());
        }
        for reloc in relocations {
            let current = self.get(reloc.ca)?;
            match current {
                Some((loc, hash)) if loc == reloc.old_location => {
                    self.set(reloc.ca, (reloc.new_location, hash))?;
                }
                _ => {
                    log::trace!(
                        "apply_relocations: {} superseded since scrub ran, skipping",
                        reloc.ca
                    );
                }
            }
        }
        self.backend.store_scrub_id(new_scrub_id)?;
        *self.scrub_id.write() = Some(new_scrub_id);
        Ok(())
    }

    /// Discard every cached mapping without persisting it (spec §4.4:
    /// "slaves throw the partial state away" on a mid-apply failure).
    pub fn clear(&self) {
        *self.cache.write() = Lru::new(self.cache.read().capacity);
    }
}

/// Rebuilds a `MetaDataStore` from scratch by replaying a volume's TLogs in
/// backend order (spec §4.4 "Rebuild").
pub struct MetaDataStoreBuilder {
    store: MetaDataStore,
    nsid_seen: Vec<CloneId>,
}

impl MetaDataStoreBuilder {
    pub fn new(backend: Arc<dyn MetaDataBackend>, max_cached_pages: usize) -> Result<Self, MetaDataStoreError> {
        Ok(Self {
            store: MetaDataStore::new(backend, max_cached_pages)?,
            nsid_seen: Vec::new(),
        })
    }

    /// Feed one TLog's cluster entries into the store, in replay order.
    /// Tracks which `CloneId` lineage levels were traversed so the caller
    /// can reconstruct the `NSIDMap` alongside the rebuilt mappings.
    pub fn replay_cluster(&mut self, ca: ClusterAddress, location: ClusterLocation) -> Result<(), MetaDataStoreError> {
        if !self.nsid_seen.contains(&location.clone_id) {
            self.nsid_seen.push(location.clone_id);
        }
        // Later entries for the same CA supersede earlier ones; TLogs are
        // replayed in monotonic order so a plain `set` is correct.
        self.store.set(ca, (location, Weed::ZERO))
    }

    pub fn seen_clone_ids(&self) -> &[CloneId] {
        &self.nsid_seen
    }

    pub fn finish(self) -> MetaDataStore {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use vd_core::SconId;

    use super::*;
    use crate::backend::mem::InMemoryBackend;

    fn store(cap: usize) -> MetaDataStore {
        MetaDataStore::new(Arc::new(InMemoryBackend::new()), cap).unwrap()
    }

    fn loc(n: u32) -> ClusterLocation {
        ClusterLocation::new(SconId(n), CloneId(0), 0)
    }

    #[test]
    fn unmapped_ca_reads_as_none() {
        let s = store(4);
        assert_eq!(s.get(ClusterAddress(5)).unwrap(), None);
    }

    #[test]
    fn set_then_get_roundtrips() {
        let s = store(4);
        s.set(ClusterAddress(1), (loc(10), Weed::of(b"x"))).unwrap();
        assert_eq!(s.get(ClusterAddress(1)).unwrap(), Some((loc(10), Weed::of(b"x"))));
    }

    #[test]
    fn eviction_writes_back_dirty_pages() {
        let s = store(1);
        // Two different pages (page size 1024) force an eviction.
        s.set(ClusterAddress(0), (loc(1), Weed::of(b"a"))).unwrap();
        s.set(ClusterAddress(crate::page::PAGE_SIZE), (loc(2), Weed::of(b"b"))).unwrap();
        // The first page was evicted but must still be readable via the
        // backend write-back path.
        assert_eq!(s.get(ClusterAddress(0)).unwrap(), Some((loc(1), Weed::of(b"a"))));
    }

    #[test]
    fn apply_relocations_is_idempotent() {
        let s = store(8);
        s.set(ClusterAddress(1), (loc(1), Weed::of(b"x"))).unwrap();
        let relocs = vec![Relocation {
            ca: ClusterAddress(1),
            old_location: loc(1),
            new_location: loc(2),
        }];
        s.apply_relocations(relocs.clone(), CloneId(0), 7).unwrap();
        assert_eq!(s.get(ClusterAddress(1)).unwrap().unwrap().0, loc(2));
        assert_eq!(s.scrub_id(), Some(7));

        // Re-apply the same scrub id: no-op, mapping unchanged even though
        // old_location no longer matches.
        s.apply_relocations(relocs, CloneId(0), 7).unwrap();
        assert_eq!(s.get(ClusterAddress(1)).unwrap().unwrap().0, loc(2));
    }

    #[test]
    fn apply_relocations_skips_superseded_writes() {
        let s = store(8);
        s.set(ClusterAddress(1), (loc(9), Weed::of(b"newer"))).unwrap();
        let relocs = vec![Relocation {
            ca: ClusterAddress(1),
            old_location: loc(1),
            new_location: loc(2),
        }];
        s.apply_relocations(relocs, CloneId(0), 3).unwrap();
        // The cluster was rewritten by a later write (loc 9), so the scrub's
        // relocation for the stale `loc(1)` is skipped.
        assert_eq!(s.get(ClusterAddress(1)).unwrap().unwrap().0, loc(9));
    }

    #[test]
    fn cork_uncork_round_trip_requires_matching_id() {
        let s = store(8);
        let id = Uuid::new_v4();
        s.set(ClusterAddress(1), (loc(1), Weed::of(b"x"))).unwrap();
        s.cork(id);
        assert!(matches!(
            s.un_cork_and_try_sync(Uuid::new_v4()),
            Err(MetaDataStoreError::CorkMismatch { .. })
        ));
        s.un_cork_and_try_sync(id).unwrap();
    }

    #[test]
    fn builder_replays_into_fresh_store() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut builder = MetaDataStoreBuilder::new(backend, 8).unwrap();
        builder.replay_cluster(ClusterAddress(0), loc(1)).unwrap();
        builder.replay_cluster(ClusterAddress(0), loc(2)).unwrap();
        let store = builder.finish();
        assert_eq!(store.get(ClusterAddress(0)).unwrap().unwrap().0, loc(2));
    }
}
