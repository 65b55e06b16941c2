use std::sync::Arc;

use parking_lot::Mutex;
use vd_core::{CloneId, ClusterLocation, SconId, Weed};
use vd_scocache::ScoCache;

use crate::error::DataStoreError;
use crate::sco::{self, OpenSco, TRAILER_LEN};
use crate::storage::ScoStorage;

/// Outcome of a single [`DataStore::allocate`] call (spec §4.1 step 2a,
/// §4.2).
#[derive(Clone, Copy, Debug)]
pub struct Allocated {
    pub location: ClusterLocation,
    pub hash: Weed,
    /// `true` once this allocation filled the open SCO to `sco_multiplier`
    /// clusters; the caller (`Volume`) must then call
    /// [`DataStore::close_current_sco`] to roll over (spec §4.1 step 3).
    pub sco_full: bool,
}

/// Result of sealing the currently-open SCO (spec §4.2 "seals ... hands it
/// to SCOCache as non-disposable, opens a new SCO").
#[derive(Clone, Copy, Debug)]
pub struct SealedSco {
    pub sco: SconId,
    pub clusters_written: u32,
    pub crc: u32,
}

/// Cluster allocator over the single currently-open SCO (spec §4.2).
/// Maintains one open, append-only SCO file plus a slab of previously
/// sealed SCOs reachable for reads; on rollover, hands the sealed SCO to
/// [`ScoCache`] as non-disposable and opens the next `SconId`.
pub struct DataStore<S: ScoStorage> {
    storage: S,
    scocache: Arc<ScoCache>,
    namespace: String,
    clone_id: CloneId,
    cluster_size: u64,
    sco_multiplier: u32,
    max_non_disposable_factor: f64,
    open: Mutex<OpenSco<S::File>>,
}

impl<S: ScoStorage> DataStore<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        storage: S,
        scocache: Arc<ScoCache>,
        namespace: impl Into<String>,
        clone_id: CloneId,
        cluster_size: u64,
        sco_multiplier: u32,
        max_non_disposable_factor: f64,
        first_sco: SconId,
    ) -> Result<Self, DataStoreError> {
        let file = storage.create(first_sco, clone_id)?;
        Ok(Self {
            storage,
            scocache,
            namespace: namespace.into(),
            clone_id,
            cluster_size,
            sco_multiplier,
            max_non_disposable_factor,
            open: Mutex::new(OpenSco {
                sco: first_sco,
                file,
                clusters_written: 0,
                running_crc: 0,
            }),
        })
    }

    pub fn sco_size(&self) -> u64 {
        self.cluster_size * self.sco_multiplier as u64 + TRAILER_LEN as u64
    }

    /// Append one cluster to the open SCO (spec §4.1 step 2a, §4.2
    /// "allocate").
    pub fn allocate(&self, data: &[u8]) -> Result<Allocated, DataStoreError> {
        if data.len() as u64 != self.cluster_size {
            return Err(DataStoreError::BadClusterSize {
                expected: self.cluster_size,
                actual: data.len(),
            });
        }
        let mut open = self.open.lock();
        if open.clusters_written >= self.sco_multiplier {
            return Err(DataStoreError::ScoFull);
        }
        let hash = Weed::of(data);
        let offset = open.append_cluster(data)?;
        let location = ClusterLocation::new(open.sco, self.clone_id, offset);
        let sco_full = open.clusters_written >= self.sco_multiplier;
        Ok(Allocated {
            location,
            hash,
            sco_full,
        })
    }

    /// Read the cluster at `location`, from the open SCO if it matches, or
    /// from a previously sealed one otherwise (spec §4.2 "read").
    pub fn read(&self, location: ClusterLocation, buf: &mut [u8]) -> Result<(), DataStoreError> {
        if buf.len() as u64 != self.cluster_size {
            return Err(DataStoreError::BadClusterSize {
                expected: self.cluster_size,
                actual: buf.len(),
            });
        }
        let mut open = self.open.lock();
        if location.sco == open.sco && location.clone_id == self.clone_id {
            if location.offset as u32 >= open.clusters_written {
                return Err(DataStoreError::Unknown(location));
            }
            return open.read_cluster(location.offset, self.cluster_size, buf);
        }
        drop(open);
        let mut file = self.storage.open(location.sco, location.clone_id)?;
        self.scocache.touch(location.sco, location.clone_id);
        use std::io::{Read, Seek, SeekFrom};
        file.seek(SeekFrom::Start(location.offset as u64 * self.cluster_size))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Flush the open SCO to stable storage without sealing it (spec §4.1
    /// "Sync": "flush open SCO to disk").
    pub fn sync(&self) -> Result<(), DataStoreError> {
        self.open.lock().sync()
    }

    /// Seal the open SCO (padding to the admitted size accounts only for
    /// clusters actually written, per spec §3 Lifecycles "sealed on
    /// rollover"), admit it to [`ScoCache`] as non-disposable, and open the
    /// next `SconId` for writing (spec §4.1 step 3, §4.2).
    pub fn close_current_sco(&self) -> Result<SealedSco, DataStoreError> {
        let mut open = self.open.lock();
        sco::write_trailer(&mut open.file, open.clusters_written, open.running_crc)?;
        open.sync()?;

        let sealed = SealedSco {
            sco: open.sco,
            clusters_written: open.clusters_written,
            crc: open.running_crc,
        };
        let size_bytes = open.clusters_written as u64 * self.cluster_size + TRAILER_LEN as u64;
        self.scocache
            .admit(&self.namespace, open.sco, self.clone_id, size_bytes)?;

        let next_sco = SconId(open.sco.0 + 1);
        let next_file = self.storage.create(next_sco, self.clone_id)?;
        *open = OpenSco {
            sco: next_sco,
            file: next_file,
            clusters_written: 0,
            running_crc: 0,
        };
        log::debug!(
            "datastore: sealed sco {} ({} clusters) in {}, opened {}",
            sealed.sco,
            sealed.clusters_written,
            self.namespace,
            next_sco
        );
        Ok(sealed)
    }

    /// Read back the full raw bytes (payload + trailer) of a SCO previously
    /// sealed by this `DataStore`, for handing off to a background upload
    /// (spec §4.8: BackendTaskRunner uploads the `<sconumber>_<cloneid>`
    /// object verbatim).
    pub fn read_sealed_sco_bytes(&self, sco: SconId) -> Result<Vec<u8>, DataStoreError> {
        use std::io::Read;
        let mut file = self.storage.open(sco, self.clone_id)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn current_sco(&self) -> SconId {
        self.open.lock().sco
    }

    pub fn current_sco_clusters(&self) -> u32 {
        self.open.lock().clusters_written
    }

    /// Whether writers should throttle: the non-disposable SCO backlog for
    /// this namespace exceeds `max_non_disposable_factor * sco_size` (spec
    /// §4.2, §5 "Suspension points").
    pub fn should_throttle(&self) -> bool {
        let backlog = self.scocache.non_disposable_bytes(&self.namespace);
        (backlog as f64) > self.max_non_disposable_factor * self.sco_size() as f64
    }
}

#[cfg(test)]
mod tests {
    use vd_core::SconId;
    use vd_scocache::FillBand;

    use super::*;
    use crate::storage::mem::MemScoStorage;

    fn band() -> FillBand {
        FillBand {
            trigger_gap: 0,
            backoff_gap: 0,
        }
    }

    fn store(sco_multiplier: u32) -> DataStore<MemScoStorage> {
        let cache = ScoCache::new(band());
        cache.add_mount_point("/mnt".into(), u64::MAX);
        DataStore::create(MemScoStorage::new(), cache, "ns0", CloneId(0), 16, sco_multiplier, 2.0, SconId(0)).unwrap()
    }

    #[test]
    fn allocate_returns_sequential_offsets_and_hash() {
        let ds = store(4);
        let a0 = ds.allocate(&[1; 16]).unwrap();
        let a1 = ds.allocate(&[2; 16]).unwrap();
        assert_eq!(a0.location.offset, 0);
        assert_eq!(a1.location.offset, 1);
        assert_ne!(a0.hash, a1.hash);
        assert!(!a0.sco_full);
    }

    #[test]
    fn allocate_signals_full_on_last_cluster() {
        let ds = store(2);
        let a0 = ds.allocate(&[1; 16]).unwrap();
        let a1 = ds.allocate(&[2; 16]).unwrap();
        assert!(!a0.sco_full);
        assert!(a1.sco_full);
    }

    #[test]
    fn allocate_rejects_wrong_cluster_size() {
        let ds = store(4);
        assert!(matches!(
            ds.allocate(&[1; 8]),
            Err(DataStoreError::BadClusterSize { .. })
        ));
    }

    #[test]
    fn read_from_open_sco_returns_written_bytes() {
        let ds = store(4);
        let a0 = ds.allocate(&[7; 16]).unwrap();
        let mut buf = [0u8; 16];
        ds.read(a0.location, &mut buf).unwrap();
        assert_eq!(buf, [7; 16]);
    }

    #[test]
    fn read_from_sealed_sco_goes_through_storage() {
        let ds = store(2);
        let a0 = ds.allocate(&[9; 16]).unwrap();
        ds.allocate(&[8; 16]).unwrap();
        let sealed = ds.close_current_sco().unwrap();
        assert_eq!(sealed.sco, SconId(0));
        assert_eq!(sealed.clusters_written, 2);

        let mut buf = [0u8; 16];
        ds.read(a0.location, &mut buf).unwrap();
        assert_eq!(buf, [9; 16]);
    }

    #[test]
    fn close_current_sco_opens_next_sco_number() {
        let ds = store(1);
        ds.allocate(&[1; 16]).unwrap();
        ds.close_current_sco().unwrap();
        assert_eq!(ds.current_sco(), SconId(1));
    }

    #[test]
    fn allocating_past_capacity_errors() {
        let ds = store(1);
        ds.allocate(&[1; 16]).unwrap();
        assert!(matches!(ds.allocate(&[2; 16]), Err(DataStoreError::ScoFull)));
    }

    #[test]
    fn non_disposable_backlog_throttles_once_over_factor() {
        let ds = store(1);
        assert!(!ds.should_throttle());
        ds.allocate(&[1; 16]).unwrap();
        ds.close_current_sco().unwrap();
        // sco_size = 16*1 + trailer(8) = 24; factor 2.0 => threshold 48.
        // One sealed, non-disposable sco (24 bytes) is under threshold.
        assert!(!ds.should_throttle());
    }
}
