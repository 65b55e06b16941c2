use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;
use vd_core::{CloneId, SconId};

use crate::error::ScoCacheError;
use crate::mount_point::{MountPoint, MountPointId};
use crate::sco::{ScoClass, ScoEntry, ScoKey};

/// Target fill band for the cleaner (spec §4.5): eviction starts once a
/// mount point's free space drops below `trigger_gap` and continues until
/// free space reaches `backoff_gap`.
#[derive(Clone, Copy, Debug)]
pub struct FillBand {
    pub trigger_gap: u64,
    pub backoff_gap: u64,
}

struct Inner {
    mount_points: Vec<MountPoint>,
    scos: HashMap<ScoKey, ScoEntry>,
    /// Namespace -> preferred mount point, used to re-home admissions away
    /// from a mount point that just broke.
    namespace_home: HashMap<String, MountPointId>,
    clock: u64,
}

impl Inner {
    fn pick_mount_point(&self, size_bytes: u64) -> Option<MountPointId> {
        self.mount_points
            .iter()
            .enumerate()
            .filter(|(_, mp)| !mp.broken && mp.free_bytes() >= size_bytes)
            .max_by_key(|(_, mp)| mp.free_bytes())
            .map(|(idx, _)| MountPointId(idx))
    }
}

/// Local on-disk cache of SCOs spread across multiple mount points (spec
/// §4.5). Tracks free space per mount point and a disposable/non-disposable
/// class per SCO; a background cleaner thread evicts least-recently-used
/// disposable SCOs when a mount point's free space runs low.
pub struct ScoCache {
    inner: RwLock<Inner>,
    band: FillBand,
}

impl ScoCache {
    pub fn new(band: FillBand) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner {
                mount_points: Vec::new(),
                scos: HashMap::new(),
                namespace_home: HashMap::new(),
                clock: 0,
            }),
            band,
        })
    }

    pub fn add_mount_point(&self, path: PathBuf, capacity_bytes: u64) -> MountPointId {
        let mut inner = self.inner.write();
        let id = MountPointId(inner.mount_points.len());
        inner.mount_points.push(MountPoint::new(path, capacity_bytes));
        id
    }

    pub fn mount_point_path(&self, id: MountPointId) -> Option<PathBuf> {
        self.inner.read().mount_points.get(id.0).map(|mp| mp.path.clone())
    }

    /// Admit a newly sealed SCO as non-disposable, allocating to the mount
    /// point with the most free space (spec §4.5: "allocates to the mount
    /// point with the most free space").
    pub fn admit(
        &self,
        namespace: &str,
        sco: SconId,
        clone_id: CloneId,
        size_bytes: u64,
    ) -> Result<MountPointId, ScoCacheError> {
        let mut inner = self.inner.write();
        let preferred = inner.namespace_home.get(namespace).copied();
        let mount = match preferred.filter(|id| {
            inner
                .mount_points
                .get(id.0)
                .map(|mp| !mp.broken && mp.free_bytes() >= size_bytes)
                .unwrap_or(false)
        }) {
            Some(id) => id,
            None => inner.pick_mount_point(size_bytes).ok_or(ScoCacheError::NoMountPoint)?,
        };

        inner.clock += 1;
        let clock = inner.clock;
        inner.mount_points[mount.0].used_bytes += size_bytes;
        inner.scos.insert(
            ScoKey::new(sco, clone_id),
            ScoEntry {
                namespace: namespace.to_string(),
                mount,
                size_bytes,
                class: ScoClass::NonDisposable,
                last_used: clock,
            },
        );
        inner.namespace_home.entry(namespace.to_string()).or_insert(mount);
        Ok(mount)
    }

    /// Mark a SCO uploaded and therefore safe to evict (spec §4.5 /
    /// Invariant 2: forward-only `NonDisposable -> Disposable`).
    pub fn mark_disposable(&self, sco: SconId, clone_id: CloneId) -> Result<(), ScoCacheError> {
        let mut inner = self.inner.write();
        let entry = inner
            .scos
            .get_mut(&ScoKey::new(sco, clone_id))
            .ok_or(ScoCacheError::Unknown(sco, clone_id))?;
        entry.class = ScoClass::Disposable;
        Ok(())
    }

    /// Bump the LRU clock for a SCO on read access.
    pub fn touch(&self, sco: SconId, clone_id: CloneId) {
        let mut inner = self.inner.write();
        inner.clock += 1;
        let clock = inner.clock;
        if let Some(entry) = inner.scos.get_mut(&ScoKey::new(sco, clone_id)) {
            entry.last_used = clock;
        }
    }

    pub fn mount_point_of(&self, sco: SconId, clone_id: CloneId) -> Option<MountPointId> {
        self.inner.read().scos.get(&ScoKey::new(sco, clone_id)).map(|e| e.mount)
    }

    /// Mark a mount point broken: it stops receiving new admissions, and any
    /// namespace currently homed there is re-homed to a healthy mount point
    /// if one exists (spec §4.5: "its namespaces are re-homed if possible").
    pub fn mark_mount_point_broken(&self, id: MountPointId) {
        let mut inner = self.inner.write();
        if let Some(mp) = inner.mount_points.get_mut(id.0) {
            mp.broken = true;
        }
        let stranded: Vec<String> = inner
            .namespace_home
            .iter()
            .filter(|(_, home)| **home == id)
            .map(|(ns, _)| ns.clone())
            .collect();
        for ns in stranded {
            match inner.pick_mount_point(0) {
                Some(new_home) => {
                    log::warn!("scocache: re-homing namespace {ns} off broken mount point {}", id.0);
                    inner.namespace_home.insert(ns, new_home);
                }
                None => {
                    log::error!("scocache: no healthy mount point to re-home namespace {ns}");
                    inner.namespace_home.remove(&ns);
                }
            }
        }
    }

    /// Evict least-recently-used disposable SCOs from any mount point whose
    /// free space has dropped below `trigger_gap`, continuing until free
    /// space reaches `backoff_gap` (spec §4.5).
    pub fn run_cleaner_pass(&self) -> Vec<(SconId, CloneId)> {
        let mut evicted = Vec::new();
        let mut inner = self.inner.write();
        let needing_cleanup: Vec<usize> = inner
            .mount_points
            .iter()
            .enumerate()
            .filter(|(_, mp)| !mp.broken && mp.free_bytes() < self.band.trigger_gap)
            .map(|(idx, _)| idx)
            .collect();

        for mp_idx in needing_cleanup {
            loop {
                if inner.mount_points[mp_idx].free_bytes() >= self.band.backoff_gap {
                    break;
                }
                let victim = inner
                    .scos
                    .iter()
                    .filter(|(_, e)| e.mount.0 == mp_idx && e.class == ScoClass::Disposable)
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| *k);

                match victim {
                    Some(key) => {
                        let entry = inner.scos.remove(&key).expect("victim key just looked up");
                        inner.mount_points[mp_idx].used_bytes -= entry.size_bytes;
                        evicted.push((key.sco, key.clone_id));
                    }
                    None => break,
                }
            }
        }
        evicted
    }

    pub fn fill_band(&self) -> FillBand {
        self.band
    }

    /// Total bytes currently held by non-disposable SCOs in `namespace`
    /// (DataStore's writer-throttle input, spec §4.2: "Throttles writers
    /// when the count of non-disposable SCOs x sco_size exceeds
    /// max_non_disposable_factor x sco_size").
    pub fn non_disposable_bytes(&self, namespace: &str) -> u64 {
        self.inner
            .read()
            .scos
            .values()
            .filter(|e| e.namespace == namespace && e.class == ScoClass::NonDisposable)
            .map(|e| e.size_bytes)
            .sum()
    }
}

/// Background thread that periodically runs the cleaner pass. Shuts down on
/// a stop signal rather than a sleep/wake race: the control loop selects
/// over a timer tick and a stop channel, so it never sleeps past a
/// requested shutdown.
pub struct Cleaner {
    stop: crossbeam_channel::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Cleaner {
    pub fn spawn(cache: Arc<ScoCache>, clean_interval: Duration) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let ticks = crossbeam_channel::tick(clean_interval);
        let handle = std::thread::spawn(move || loop {
            crossbeam_channel::select! {
                recv(stop_rx) -> _ => break,
                recv(ticks) -> _ => {
                    let evicted = cache.run_cleaner_pass();
                    if !evicted.is_empty() {
                        log::debug!("scocache cleaner evicted {} scos", evicted.len());
                    }
                }
            }
        });
        Self {
            stop: stop_tx,
            handle: Some(handle),
        }
    }

    pub fn shutdown(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Cleaner {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vd_core::{CloneId, SconId};

    fn band() -> FillBand {
        FillBand {
            trigger_gap: 100,
            backoff_gap: 300,
        }
    }

    #[test]
    fn admits_to_mount_point_with_most_free_space() {
        let cache = ScoCache::new(band());
        let small = cache.add_mount_point("/a".into(), 100);
        let big = cache.add_mount_point("/b".into(), 1000);
        let picked = cache.admit("ns", SconId(1), CloneId(0), 50).unwrap();
        assert_eq!(picked, big);
        let _ = small;
    }

    #[test]
    fn non_disposable_scos_are_never_evicted() {
        let cache = ScoCache::new(band());
        cache.add_mount_point("/a".into(), 1000);
        cache.admit("ns", SconId(1), CloneId(0), 950).unwrap();
        let evicted = cache.run_cleaner_pass();
        assert!(evicted.is_empty());
    }

    #[test]
    fn cleaner_evicts_lru_disposable_until_backoff_gap() {
        let cache = ScoCache::new(band());
        cache.add_mount_point("/a".into(), 1000);
        cache.admit("ns", SconId(1), CloneId(0), 310).unwrap();
        cache.admit("ns", SconId(2), CloneId(0), 310).unwrap();
        cache.admit("ns", SconId(3), CloneId(0), 310).unwrap();
        cache.mark_disposable(SconId(1), CloneId(0)).unwrap();
        cache.mark_disposable(SconId(2), CloneId(0)).unwrap();
        cache.mark_disposable(SconId(3), CloneId(0)).unwrap();

        // used=930, free=70 < trigger_gap(100): cleaner kicks in, evicting
        // the single oldest disposable sco is enough to clear backoff_gap(300).
        let evicted = cache.run_cleaner_pass();
        assert_eq!(evicted, vec![(SconId(1), CloneId(0))]);
    }

    #[test]
    fn broken_mount_point_stops_admission_and_rehomes() {
        let cache = ScoCache::new(band());
        let broken = cache.add_mount_point("/a".into(), 1000);
        let healthy = cache.add_mount_point("/b".into(), 1000);
        cache.admit("ns", SconId(1), CloneId(0), 10).unwrap();
        cache.mark_mount_point_broken(broken);
        let picked = cache.admit("ns", SconId(2), CloneId(0), 10).unwrap();
        assert_eq!(picked, healthy);
    }
}
