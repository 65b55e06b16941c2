use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use uuid::Uuid;
use vd_core::Weed;

/// Process-global LRU cache of cluster contents, keyed by `(volume handle,
/// content hash)` (spec §5: "ClusterCache is process-global LRU keyed by
/// (handle, hash)"). One instance is typically constructed at process
/// startup and shared (via `Arc`) across every open [`crate::Volume`], the
/// same way `vd_scocache::ScoCache` is process-wide rather than per-volume.
pub struct ClusterCache {
    inner: Mutex<Inner>,
}

struct Inner {
    capacity: usize,
    entries: HashMap<(Uuid, Weed), Vec<u8>>,
    order: VecDeque<(Uuid, Weed)>,
}

impl ClusterCache {
    pub fn new(capacity_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity: capacity_entries.max(1),
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, volume: Uuid, hash: Weed) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        let key = (volume, hash);
        let hit = inner.entries.get(&key).cloned();
        if hit.is_some() {
            inner.touch(key);
        }
        hit
    }

    pub fn put(&self, volume: Uuid, hash: Weed, data: Vec<u8>) {
        let mut inner = self.inner.lock();
        let key = (volume, hash);
        if inner.entries.len() >= inner.capacity && !inner.entries.contains_key(&key) {
            if let Some(lru) = inner.order.pop_front() {
                inner.entries.remove(&lru);
            }
        }
        inner.entries.insert(key, data);
        inner.touch(key);
    }

    /// Drop every entry belonging to `volume` (used on `destroy`/halt so a
    /// reused volume id can't observe stale cached content).
    pub fn evict_volume(&self, volume: Uuid) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|(v, _), _| *v != volume);
        inner.order.retain(|(v, _)| *v != volume);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn touch(&mut self, key: (Uuid, Weed)) {
        if let Some(pos) = self.order.iter().position(|k| *k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let cache = ClusterCache::new(4);
        let vol = Uuid::new_v4();
        let hash = Weed::of(b"data");
        cache.put(vol, hash, b"data".to_vec());
        assert_eq!(cache.get(vol, hash), Some(b"data".to_vec()));
    }

    #[test]
    fn evicts_lru_once_over_capacity() {
        let cache = ClusterCache::new(2);
        let vol = Uuid::new_v4();
        let h1 = Weed::of(b"1");
        let h2 = Weed::of(b"2");
        let h3 = Weed::of(b"3");
        cache.put(vol, h1, b"1".to_vec());
        cache.put(vol, h2, b"2".to_vec());
        cache.put(vol, h3, b"3".to_vec());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(vol, h1), None);
        assert_eq!(cache.get(vol, h3), Some(b"3".to_vec()));
    }

    #[test]
    fn evict_volume_clears_only_that_volumes_entries() {
        let cache = ClusterCache::new(8);
        let v1 = Uuid::new_v4();
        let v2 = Uuid::new_v4();
        let hash = Weed::of(b"x");
        cache.put(v1, hash, b"x".to_vec());
        cache.put(v2, hash, b"x".to_vec());
        cache.evict_volume(v1);
        assert_eq!(cache.get(v1, hash), None);
        assert_eq!(cache.get(v2, hash), Some(b"x".to_vec()));
    }
}
