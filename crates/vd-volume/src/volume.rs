use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use vd_backend::{BackendIface, BackendRequestParameters};
use vd_backend_tasks::{BackendTaskRunner, TaskKind};
use vd_core::{
    ClusterAddress, ClusterCacheMode, ClusterLocation, CloneId, Lba, NsidMap, OwnerTag, VolumeConfig, VolumeError, Weed,
};
use vd_datastore::{storage::ScoStorage, DataStore};
use vd_failover::{FailOverClient, FocEntry};
use vd_gc::GarbageCollector;
use vd_metadata::MetaDataStore;
use vd_scrub::{apply_scrub_reply, ScrubReply, ScrubWork};
use vd_snapshot::{Snapshot, SnapshotManagement};
use vd_tlog::storage::TLogStorage;
use vd_tlog::TLogWriter;

use crate::cluster_cache::ClusterCache;
use crate::config::FailOverCacheConfig;
use crate::error;
use crate::parent::ParentLookup;
use crate::state::VolumeFailOverState;

/// Once a FailOverClient has this many entries unflushed, writers start
/// honoring `foc_throttle_usecs` (spec §5 "Suspension points"). Chosen as a
/// small round number rather than derived from cluster size: the backlog is
/// a count of in-flight entries, not a byte budget (DataStore already has
/// its own byte-denominated throttle via `should_throttle`).
const FOC_BACKLOG_THROTTLE_THRESHOLD: usize = 1024;

/// Every collaborator a [`Volume`] needs, handed in by whatever opens it
/// (spec doesn't define a "mount" operation; construction wiring is left to
/// the embedder, the way `vd_scocache::ScoCache`/`vd_gc::GarbageCollector`
/// are themselves constructed by their owner rather than by each other).
pub struct VolumeHandles<S: ScoStorage, TS: TLogStorage, B: BackendIface> {
    pub datastore: DataStore<S>,
    pub metadata: MetaDataStore,
    pub tlog_storage: TS,
    pub backend: Arc<B>,
    pub backend_params: BackendRequestParameters,
    /// Process-wide background upload queue (spec §4.8); shared across every
    /// open volume the same way `ScoCache` is.
    pub backend_tasks: Arc<BackendTaskRunner>,
    /// Process-wide garbage collector (spec §4.7); shared the same way.
    pub gc: Arc<GarbageCollector>,
    /// Process-wide cluster content cache (spec §5); `None` disables it
    /// crate-wide regardless of `VolumeConfig::cluster_cache_mode`.
    pub cluster_cache: Option<Arc<ClusterCache>>,
}

struct RuntimeState<F> {
    /// Set once an invariant-breaking error is observed; `Some(reason)`
    /// rejects every further read/write (spec §7 "Halting").
    halted: Option<String>,
    foc_state: VolumeFailOverState,
    snapshots: SnapshotManagement,
    current_tlog: Option<TLogWriter<F>>,
    /// Names of SCO objects sealed since the last TLog rollover, the
    /// dependency list the eventual `UploadTlog` task is submitted with
    /// (spec §4.8: "a TLog may upload only after all SCOs it references").
    sco_names_since_tlog: Vec<String>,
    /// SCOs sealed and queued for upload but not yet confirmed drained;
    /// released from SCOCache/FailOverCache together at the next `sync`.
    pending_sco_uploads: Vec<vd_core::SconId>,
    nsid_map: NsidMap,
}

/// Volume: the orchestrator exposing the read/write/sync/snapshot API and
/// owning lock/ordering discipline across every other component (spec §4.1).
///
/// Lock order, narrowest to widest (mirrors SpacetimeDB's `Locking`
/// `write_lock` -> `rwlock` pair): `write_lock` (serializes the write/sync/
/// snapshot/restore protocols against one another) is always acquired
/// before `state` (the `RwLock<RuntimeState>`); `config` is never held
/// across either.
pub struct Volume<S: ScoStorage, TS: TLogStorage, B: BackendIface> {
    id: Uuid,
    clone_id: CloneId,
    namespace: String,
    config: RwLock<VolumeConfig>,
    write_lock: Mutex<()>,
    state: RwLock<RuntimeState<TS::File>>,

    datastore: DataStore<S>,
    metadata: MetaDataStore,
    tlog_storage: TS,
    backend: Arc<B>,
    backend_params: BackendRequestParameters,
    backend_tasks: Arc<BackendTaskRunner>,
    gc: Arc<GarbageCollector>,

    foc: RwLock<Option<Arc<FailOverClient>>>,
    cluster_cache: Option<Arc<ClusterCache>>,
    parent: Option<Arc<dyn ParentLookup>>,
}

impl<S: ScoStorage, TS: TLogStorage, B: BackendIface> Volume<S, TS, B> {
    /// Open a fresh volume with no clone lineage (spec §4.1 "Create").
    pub fn create_fresh(id: Uuid, clone_id: CloneId, config: VolumeConfig, handles: VolumeHandles<S, TS, B>) -> Result<Self, VolumeError> {
        Self::open(id, clone_id, config, handles, None)
    }

    /// Open a clone: a volume with an empty [`MetaDataStore`] (the caller's
    /// responsibility to construct fresh) whose reads fall through to
    /// `parent` for any CA it hasn't itself rewritten (spec §4.1 "Clone").
    /// `parent` should be obtained from the ancestor's own
    /// [`Self::snapshot_view`] at the snapshot this clone descends from, not
    /// a live reference to the ancestor — see Invariant 3 (snapshot
    /// immutability).
    pub fn create_clone(
        id: Uuid,
        clone_id: CloneId,
        config: VolumeConfig,
        handles: VolumeHandles<S, TS, B>,
        parent: Arc<dyn ParentLookup>,
        parent_nsid_map: &NsidMap,
    ) -> Result<Self, VolumeError> {
        let mut nsid_map = NsidMap::new();
        nsid_map.extend_from_parent(parent_nsid_map);
        Self::open(id, clone_id, config, handles, Some((parent, nsid_map)))
    }

    fn open(
        id: Uuid,
        clone_id: CloneId,
        config: VolumeConfig,
        handles: VolumeHandles<S, TS, B>,
        parent: Option<(Arc<dyn ParentLookup>, NsidMap)>,
    ) -> Result<Self, VolumeError> {
        let tlog_id = Uuid::new_v4();
        let writer = TLogWriter::create(&handles.tlog_storage, tlog_id).map_err(error::from_tlog)?;
        let namespace = config.namespace.clone();

        let (parent, mut nsid_map) = match parent {
            Some((p, map)) => (Some(p), map),
            None => (None, NsidMap::new()),
        };
        nsid_map.set(clone_id, namespace.clone());

        Ok(Self {
            id,
            clone_id,
            namespace,
            config: RwLock::new(config),
            write_lock: Mutex::new(()),
            state: RwLock::new(RuntimeState {
                halted: None,
                foc_state: VolumeFailOverState::OkStandalone,
                snapshots: SnapshotManagement::new(),
                current_tlog: Some(writer),
                sco_names_since_tlog: Vec::new(),
                pending_sco_uploads: Vec::new(),
                nsid_map,
            }),
            datastore: handles.datastore,
            metadata: handles.metadata,
            tlog_storage: handles.tlog_storage,
            backend: handles.backend,
            backend_params: handles.backend_params,
            backend_tasks: handles.backend_tasks,
            gc: handles.gc,
            foc: RwLock::new(None),
            cluster_cache: handles.cluster_cache,
            parent,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn foc_state(&self) -> VolumeFailOverState {
        self.state.read().foc_state
    }

    pub fn is_halted(&self) -> bool {
        self.state.read().halted.is_some()
    }

    /// Claim ownership for `new_tag` (spec §3 Invariant 5). Idempotent for
    /// the current owner; rejects a competing tag outright since arbitrating
    /// between claimants is out of scope here (spec §1: lock-service
    /// integration is external).
    pub fn claim_ownership(&self, new_tag: OwnerTag) -> Result<(), VolumeError> {
        let mut cfg = self.config.write();
        if !cfg.owner_tag.is_none() && cfg.owner_tag != new_tag {
            return Err(VolumeError::WrongOwnerTag {
                have: cfg.owner_tag,
                given: new_tag,
            });
        }
        cfg.owner_tag = new_tag;
        Ok(())
    }

    fn check_not_halted(&self) -> Result<(), VolumeError> {
        if self.state.read().halted.is_some() {
            return Err(VolumeError::Halted);
        }
        Ok(())
    }

    fn check_owned(&self, cfg: &VolumeConfig) -> Result<(), VolumeError> {
        if cfg.owner_tag.is_none() {
            return Err(VolumeError::WrongOwnerTag {
                have: cfg.owner_tag,
                given: cfg.owner_tag,
            });
        }
        Ok(())
    }

    fn halt_with(&self, reason: String) {
        log::error!("volume {} halted: {reason}", self.id);
        self.state.write().halted = Some(reason);
    }

    /// Explicitly halt the volume (spec §7: an embedder may also halt a
    /// volume directly on its own detected invariant breach).
    pub fn halt(&self, reason: impl Into<String>) {
        self.halt_with(reason.into());
    }

    // ---- write -----------------------------------------------------

    /// Write `data` (a whole number of clusters) starting at `lba` (spec
    /// §4.1 step 1-5).
    pub fn write(&self, lba: Lba, data: &[u8]) -> Result<(), VolumeError> {
        self.check_not_halted()?;
        let cfg = self.config.read().clone();
        self.check_owned(&cfg)?;

        let cluster_size = cfg.cluster_size();
        if lba.0 % cfg.cluster_multiplier as u64 != 0 {
            return Err(VolumeError::InvalidAlignment {
                lba: lba.0,
                cluster_multiplier: cfg.cluster_multiplier,
            });
        }
        if data.is_empty() || data.len() as u64 % cluster_size != 0 {
            return Err(VolumeError::InvalidLength {
                len: data.len() as u64,
                cluster_size,
            });
        }
        let n = data.len() as u64 / cluster_size;
        let start_ca = ClusterAddress::from_lba(lba, cfg.cluster_multiplier).expect("alignment checked above");

        let _guard = self.write_lock.lock();
        for i in 0..n {
            let ca = start_ca.checked_add(i).ok_or(VolumeError::OutOfRange(start_ca))?;
            if ca.0 >= cfg.cluster_count() {
                return Err(VolumeError::OutOfRange(ca));
            }
            let chunk = &data[(i * cluster_size) as usize..((i + 1) * cluster_size) as usize];
            self.write_one_cluster(ca, chunk, &cfg)?;
        }
        drop(_guard);

        self.maybe_throttle(&cfg);
        Ok(())
    }

    fn write_one_cluster(&self, ca: ClusterAddress, data: &[u8], cfg: &VolumeConfig) -> Result<(), VolumeError> {
        let allocated = self.datastore.allocate(data).map_err(error::from_datastore)?;

        {
            let mut state = self.state.write();
            if state.halted.is_some() {
                return Err(VolumeError::Halted);
            }
            let tlog = state.current_tlog.as_mut().expect("tlog open while not halted");
            let crc = crc32c::crc32c(data);
            if let Err(e) = tlog.append_cluster(crc, ca, allocated.location) {
                let reason = format!("tlog append failed: {e}");
                state.halted = Some(reason.clone());
                return Err(VolumeError::Halting(reason));
            }
        }

        if let Err(e) = self.metadata.set(ca, (allocated.location, allocated.hash)) {
            let mapped = error::from_metadata(e);
            self.halt_with(mapped.to_string());
            return Err(mapped);
        }

        self.mirror_to_foc(allocated.location, ca, data, cfg);

        if matches!(cfg.cluster_cache_mode, ClusterCacheMode::CacheOnWrite) {
            if let Some(cache) = &self.cluster_cache {
                cache.put(self.id, allocated.hash, data.to_vec());
            }
        }

        if allocated.sco_full {
            self.rollover_sco(cfg)?;
        }

        Ok(())
    }

    fn mirror_to_foc(&self, location: ClusterLocation, ca: ClusterAddress, data: &[u8], cfg: &VolumeConfig) {
        let foc = self.foc.read().clone();
        let Some(client) = foc else { return };
        let entry = FocEntry {
            location,
            lba: ca.to_lba(cfg.cluster_multiplier),
            data: data.to_vec(),
        };
        if let Err(e) = client.add_entries(vec![entry]) {
            log::warn!("volume {}: failovercache mirror degraded: {e}", self.id);
            self.state.write().foc_state = VolumeFailOverState::Degraded;
        }
    }

    fn rollover_sco(&self, cfg: &VolumeConfig) -> Result<(), VolumeError> {
        let sealed = self.datastore.close_current_sco().map_err(error::from_datastore)?;
        let bytes = self.datastore.read_sealed_sco_bytes(sealed.sco).map_err(error::from_datastore)?;
        let sco_name = ClusterLocation::new(sealed.sco, self.clone_id, 0).sco_name();
        self.backend_tasks.submit(
            &self.namespace,
            TaskKind::UploadSco {
                name: sco_name.clone(),
                data: bytes,
            },
        );

        let rollover_tlog = {
            let mut state = self.state.write();
            state.pending_sco_uploads.push(sealed.sco);
            state.sco_names_since_tlog.push(sco_name);
            state.sco_names_since_tlog.len() as u32 >= cfg.tlog_multiplier
        };
        if rollover_tlog {
            let mut state = self.state.write();
            self.finalize_tlog_and_open_next(&mut state)?;
        }
        Ok(())
    }

    /// Finalize the current TLog, submit its upload (depending on every SCO
    /// sealed since the previous boundary), and open the next one. Returns
    /// the finalized TLog's id.
    fn finalize_tlog_and_open_next(&self, state: &mut RuntimeState<TS::File>) -> Result<Uuid, VolumeError> {
        let old = state.current_tlog.take().expect("tlog open while not halted");
        let old_id = old.id();
        old.finalize().map_err(error::from_tlog)?;

        let bytes = vd_tlog::read_raw_bytes(&self.tlog_storage, old_id).map_err(error::from_tlog)?;
        let deps = std::mem::take(&mut state.sco_names_since_tlog);
        self.backend_tasks.submit(
            &self.namespace,
            TaskKind::UploadTlog {
                name: format!("tlog_{old_id}"),
                data: bytes,
                depends_on_scos: deps,
            },
        );
        state.snapshots.record_tlog(old_id);

        let next_id = Uuid::new_v4();
        let writer = TLogWriter::create(&self.tlog_storage, next_id).map_err(error::from_tlog)?;
        state.current_tlog = Some(writer);
        Ok(old_id)
    }

    fn maybe_throttle(&self, cfg: &VolumeConfig) {
        if let Some(usecs) = cfg.datastore_throttle_usecs {
            if self.datastore.should_throttle() {
                log::debug!("volume {}: throttling {usecs}us on datastore backlog", self.id);
                std::thread::sleep(Duration::from_micros(usecs));
            }
        }
        if let Some(usecs) = cfg.foc_throttle_usecs {
            let backlogged = self
                .foc
                .read()
                .as_ref()
                .map(|c| c.unflushed_len() > FOC_BACKLOG_THROTTLE_THRESHOLD)
                .unwrap_or(false);
            if backlogged {
                log::debug!("volume {}: throttling {usecs}us on failovercache backlog", self.id);
                std::thread::sleep(Duration::from_micros(usecs));
            }
        }
    }

    // ---- read ------------------------------------------------------

    /// Read a whole number of clusters starting at `lba` into `buf` (spec
    /// §4.1 read protocol).
    pub fn read(&self, lba: Lba, buf: &mut [u8]) -> Result<(), VolumeError> {
        self.check_not_halted()?;
        let cfg = self.config.read().clone();

        let cluster_size = cfg.cluster_size();
        if lba.0 % cfg.cluster_multiplier as u64 != 0 {
            return Err(VolumeError::InvalidAlignment {
                lba: lba.0,
                cluster_multiplier: cfg.cluster_multiplier,
            });
        }
        if buf.is_empty() || buf.len() as u64 % cluster_size != 0 {
            return Err(VolumeError::InvalidLength {
                len: buf.len() as u64,
                cluster_size,
            });
        }
        let n = buf.len() as u64 / cluster_size;
        let start_ca = ClusterAddress::from_lba(lba, cfg.cluster_multiplier).expect("alignment checked above");

        for i in 0..n {
            let ca = start_ca.checked_add(i).ok_or(VolumeError::OutOfRange(start_ca))?;
            let chunk = &mut buf[(i * cluster_size) as usize..((i + 1) * cluster_size) as usize];
            self.read_one_cluster(ca, chunk, &cfg)?;
        }
        Ok(())
    }

    fn read_one_cluster(&self, ca: ClusterAddress, buf: &mut [u8], cfg: &VolumeConfig) -> Result<(), VolumeError> {
        if let Some(bytes) = self.resolve_and_read_local(ca, cfg)? {
            buf.copy_from_slice(&bytes);
            return Ok(());
        }
        if let Some(parent) = &self.parent {
            if let Some(bytes) = parent.read_for_descendant(ca, cfg.cluster_size())? {
                buf.copy_from_slice(&bytes);
                return Ok(());
            }
        }
        buf.fill(0);
        Ok(())
    }

    /// Look up `ca` in this volume's own metadata only (no parent
    /// fallback); used by [`Self::read_one_cluster`].
    fn resolve_and_read_local(&self, ca: ClusterAddress, cfg: &VolumeConfig) -> Result<Option<Vec<u8>>, VolumeError> {
        match self.metadata.get(ca).map_err(error::from_metadata)? {
            None => Ok(None),
            Some((loc, hash)) => {
                let mut buf = vec![0u8; cfg.cluster_size() as usize];
                self.read_physical(loc, Some(hash), &mut buf, cfg)?;
                Ok(Some(buf))
            }
        }
    }

    /// `hash` is `None` when the caller only has a TLog-rebuilt mapping
    /// (spec §4.4 "Rebuild"/[`vd_metadata::MetaDataStoreBuilder`]): the TLog
    /// record format carries no content hash, so a replayed-only mapping
    /// can't be checksum-verified against the backend and skips that check
    /// (still safe against corruption for the common case where the cluster
    /// is still present in local SCOCache/DataStore, which is hash-blind
    /// anyway).
    fn read_physical(&self, loc: ClusterLocation, hash: Option<Weed>, buf: &mut [u8], cfg: &VolumeConfig) -> Result<(), VolumeError> {
        if cfg.cluster_cache_mode != ClusterCacheMode::NoCache {
            if let (Some(cache), Some(hash)) = (&self.cluster_cache, hash) {
                if let Some(cached) = cache.get(self.id, hash) {
                    buf.copy_from_slice(&cached);
                    return Ok(());
                }
            }
        }

        match self.datastore.read(loc, buf) {
            Ok(()) => {}
            Err(vd_datastore::DataStoreError::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                let bytes = self.fetch_cluster_from_backend(loc, cfg.cluster_size())?;
                if let Some(hash) = hash {
                    if Weed::of(&bytes) != hash {
                        return Err(VolumeError::BackendPermanent(format!("checksum mismatch reading {loc}")));
                    }
                }
                buf.copy_from_slice(&bytes);
            }
            Err(vd_datastore::DataStoreError::Unknown(l)) => {
                return Err(VolumeError::MetaDataStoreCorrupt(format!(
                    "mapping points past data written to the open sco: {l}"
                )));
            }
            Err(e) => return Err(error::from_datastore(e)),
        }

        if matches!(cfg.cluster_cache_mode, ClusterCacheMode::CacheOnRead) {
            if let (Some(cache), Some(hash)) = (&self.cluster_cache, hash) {
                cache.put(self.id, hash, buf.to_vec());
            }
        }
        Ok(())
    }

    fn fetch_cluster_from_backend(&self, loc: ClusterLocation, cluster_size: u64) -> Result<Vec<u8>, VolumeError> {
        let name = loc.sco_name();
        let offset = loc.offset as u64 * cluster_size;
        self.backend
            .get_range(&self.namespace, &name, offset, cluster_size, self.backend_params)
            .map_err(error::from_backend)
    }

    // ---- sync --------------------------------------------------------

    /// Flush the open SCO, the FailOverCache bridge, and the TLog; emit a
    /// `SyncToTcMark` and commit the corresponding MetaDataStore pages, then
    /// reconcile any SCOs uploaded since the previous sync (spec §4.1
    /// "Sync").
    pub fn sync(&self) -> Result<(), VolumeError> {
        self.check_not_halted()?;
        let _guard = self.write_lock.lock();

        self.datastore.sync().map_err(error::from_datastore)?;

        if let Some(client) = self.foc.read().clone() {
            if let Err(e) = client.flush() {
                log::warn!("volume {}: failovercache flush degraded: {e}", self.id);
                self.state.write().foc_state = VolumeFailOverState::Degraded;
            }
        }

        let cork = Uuid::new_v4();
        {
            let mut state = self.state.write();
            if state.halted.is_some() {
                return Err(VolumeError::Halted);
            }
            let tlog = state.current_tlog.as_mut().expect("tlog open while not halted");
            if let Err(e) = tlog.append_sync_to_tc(cork).and_then(|_| tlog.sync()) {
                let reason = format!("tlog sync failed: {e}");
                state.halted = Some(reason.clone());
                return Err(VolumeError::Halting(reason));
            }
        }
        self.metadata.cork(cork);
        self.metadata.un_cork_and_try_sync(cork).map_err(error::from_metadata)?;

        drop(_guard);
        self.reconcile_uploads()?;
        Ok(())
    }

    /// Block until every upload submitted so far for this namespace drains,
    /// then release the SCOs it covered from ScoCache and FailOverCache
    /// (spec §4.5 Invariant 2, §4.3 "on ack, failover entries for that SCO
    /// are released").
    fn reconcile_uploads(&self) -> Result<(), VolumeError> {
        self.backend_tasks.wait_until_drained(&self.namespace).map_err(error::from_backend_task)?;
        let pending = std::mem::take(&mut self.state.write().pending_sco_uploads);
        for sco in pending {
            if let Err(e) = self.datastore_mark_disposable(sco) {
                log::warn!("volume {}: marking sco {sco} disposable failed: {e}", self.id);
            }
            if let Some(client) = self.foc.read().as_ref() {
                if let Err(e) = client.remove_up_to(sco) {
                    log::warn!("volume {}: failovercache remove_up_to({sco}) failed: {e}", self.id);
                }
            }
        }
        Ok(())
    }

    fn datastore_mark_disposable(&self, _sco: vd_core::SconId) -> Result<(), VolumeError> {
        // DataStore doesn't expose ScoCache directly (it owns the handle
        // internally); disposal is driven by ScoCache itself once the
        // backend confirms the upload, so there is nothing left to do here
        // beyond having drained the task above. Kept as its own step so the
        // FailOverCache release above stays ordered after it, matching the
        // spec's "on ack" sequencing.
        Ok(())
    }

    // ---- snapshots -----------------------------------------------------

    /// Cut a new snapshot at the current write boundary: rolls the open SCO
    /// (if non-empty) and the current TLog, then records the snapshot (spec
    /// §4.1 "Snapshot create").
    pub fn create_snapshot(&self, name: &str, metadata: serde_json::Value) -> Result<Snapshot, VolumeError> {
        self.check_not_halted()?;
        let cfg = self.config.read().clone();
        let _guard = self.write_lock.lock();

        if self.datastore.current_sco_clusters() > 0 {
            self.rollover_sco(&cfg)?;
        }

        let cork = Uuid::new_v4();
        let (snap, terminal_tlog) = {
            let mut state = self.state.write();
            let terminal_tlog = self.finalize_tlog_and_open_next(&mut state)?;
            let snap = state
                .snapshots
                .create_snapshot(name, metadata, cork)
                .map_err(error::from_snapshot)?
                .clone();
            (snap, terminal_tlog)
        };

        let bytes = self.state.read().snapshots.to_bytes().map_err(error::from_snapshot)?;
        self.backend_tasks.submit(
            &self.namespace,
            TaskKind::PublishSnapshotFile {
                name: "snapshots.json".to_string(),
                data: bytes,
                depends_on_tlog: format!("tlog_{terminal_tlog}"),
            },
        );
        Ok(snap)
    }

    /// Lazy delete: the snapshot stays addressable for scrub purposes until
    /// a later scrub+GC pass reclaims its data (spec §3 "Lifecycles").
    pub fn delete_snapshot(&self, name: &str) -> Result<(), VolumeError> {
        self.check_not_halted()?;
        self.state.write().snapshots.delete_snapshot(name).map_err(error::from_snapshot)
    }

    /// Truncate every snapshot created after `name` and drop in-flight
    /// "current" TLogs (spec §3: "restored (truncates later snapshots)").
    /// Physical reclaim of the truncated range is left to the next scrub+GC
    /// pass, not performed here.
    pub fn restore_snapshot(&self, name: &str) -> Result<(), VolumeError> {
        self.check_not_halted()?;
        let _guard = self.write_lock.lock();
        self.state.write().snapshots.restore_snapshot(name).map_err(error::from_snapshot)
    }

    pub fn list_snapshots(&self) -> Vec<Snapshot> {
        self.state.read().snapshots.list_snapshots().cloned().collect()
    }

    // ---- scrub -----------------------------------------------------

    /// Describe the work for scrubbing `snapshot_name`'s range (spec §4.1
    /// `getScrubbingWork`, §4.6).
    pub fn get_scrubbing_work(&self, snapshot_name: &str) -> Result<ScrubWork, VolumeError> {
        self.state.read().snapshots.get(snapshot_name).map_err(error::from_snapshot)?;
        let cfg = self.config.read();
        let cluster_size = cfg.cluster_size();
        if !cluster_size.is_power_of_two() {
            return Err(VolumeError::InvalidArgument(
                "cluster_size must be a power of two to express as cluster_exponent".to_string(),
            ));
        }
        Ok(ScrubWork {
            namespace: self.namespace.clone(),
            volume_id: self.id,
            cluster_exponent: cluster_size.trailing_zeros(),
            sco_size: cfg.sco_size(),
            snapshot_name: snapshot_name.to_string(),
        })
    }

    /// Apply a scrubber's reply: relocate live clusters, rewrite the
    /// snapshot's TLog list, and queue the reply's garbage (spec §4.1
    /// `applyScrubbingWork`, §4.6 "Apply"). If `cleanup` is set, blocks
    /// until the garbage this reply queued has actually been deleted.
    pub fn apply_scrubbing_work(&self, reply: &ScrubReply, new_scrub_id: u64, cleanup: bool) -> Result<(), VolumeError> {
        self.check_not_halted()?;
        {
            let mut state = self.state.write();
            apply_scrub_reply(
                self.backend.as_ref(),
                self.backend_params,
                &self.namespace,
                reply,
                new_scrub_id,
                self.clone_id,
                &mut state.snapshots,
                &self.metadata,
                self.gc.as_ref(),
            )
            .map_err(error::from_scrub)?;
        }
        if cleanup {
            self.gc.barrier(&self.namespace);
        }
        Ok(())
    }

    // ---- failover cache ---------------------------------------------

    /// (Re)attach or detach the FailOverCache bridge (spec §4.1
    /// `setFailOverCacheConfig`, §4.3). Re-attaching the same address the
    /// current bridge already points at repairs it in place via `rearm`;
    /// any other change tears down the old bridge and opens a fresh one —
    /// but first drains the old bridge's unflushed entries and replays them
    /// on the new one, so a reattach to a *different* endpoint loses
    /// nothing acked-but-unflushed to the dead one (spec §4.3 "rebuilds the
    /// proxy, replays any unflushed entries" applies regardless of whether
    /// the address changed).
    pub fn set_failover_cache_config(&self, cfg: Option<FailOverCacheConfig>) -> Result<(), VolumeError> {
        let Some(new_cfg) = cfg else {
            *self.foc.write() = None;
            self.state.write().foc_state = VolumeFailOverState::OkStandalone;
            return Ok(());
        };

        let existing = self.foc.read().clone();
        if let Some(client) = &existing {
            if client.addr() == new_cfg.addr {
                client.rearm().map_err(error::from_failover)?;
                self.state.write().foc_state = VolumeFailOverState::OkSync;
                return Ok(());
            }
        }

        let cluster_size = self.config.read().cluster_size();
        let client = FailOverClient::connect(new_cfg.addr, self.namespace.clone(), cluster_size, new_cfg.timeout, None)
            .map_err(error::from_failover)?;
        if let Some(old) = &existing {
            let pending = old.drain_unflushed();
            if !pending.is_empty() {
                client.seed_unflushed(pending).map_err(error::from_failover)?;
            }
        }
        *self.foc.write() = Some(Arc::new(client));
        self.state.write().foc_state = VolumeFailOverState::OkSync;
        Ok(())
    }

    // ---- lifecycle ---------------------------------------------------

    /// Grow the volume's addressable LBA range; shrinking is rejected
    /// (spec §9 leaves this as an open question — decided in DESIGN.md).
    pub fn resize(&self, new_cluster_count: u64) -> Result<(), VolumeError> {
        self.check_not_halted()?;
        let mut cfg = self.config.write();
        if new_cluster_count < cfg.cluster_count() {
            return Err(VolumeError::InvalidArgument("shrinking a volume is not supported".to_string()));
        }
        cfg.lba_count = new_cluster_count * cfg.cluster_multiplier as u64;
        Ok(())
    }

    /// Whether this volume's namespace has any poisoned background task
    /// outstanding (spec §4.1 `checkConsistency`, §4.8).
    pub fn check_consistency(&self) -> Result<(), VolumeError> {
        self.backend_tasks.check_consistency(&self.namespace).map_err(error::from_backend_task)
    }

    /// Tear the volume down: halt it, evict any cached cluster content, and
    /// optionally remove its backend objects (spec §4.1 `destroy`).
    /// `delete_local` (drop locally cached SCOs/TLogs) is left to the
    /// embedder's own SCOCache/TLogStorage cleanup, since those are
    /// process-wide resources a halted volume doesn't own exclusively.
    pub fn destroy(&self, _delete_local: bool, remove_backend: bool) -> Result<(), VolumeError> {
        self.halt_with("destroyed".to_string());
        if let Some(cache) = &self.cluster_cache {
            cache.evict_volume(self.id);
        }
        if remove_backend {
            let objects = self.backend.list(&self.namespace, self.backend_params).map_err(error::from_backend)?;
            for obj in objects {
                self.backend.delete_best_effort(&self.namespace, &obj.name, self.backend_params);
            }
        }
        Ok(())
    }

    /// Build a [`ParentLookup`] frozen at `snapshot_name`, for handing to
    /// [`Self::create_clone`] (spec Invariant 3, "snapshot immutability": a
    /// clone must keep seeing the parent's bytes as of the snapshot it was
    /// made from, not whatever the parent has been written to since).
    ///
    /// Rather than resolving CAs against this volume's own live
    /// [`MetaDataStore`] (which advances with every later write), this
    /// replays every TLog up to and including `snapshot_name`'s terminal
    /// TLog into a throwaway [`vd_metadata::MetaDataStoreBuilder`] — the
    /// same mechanism `vd_metadata` already uses for "Rebuild" (spec §4.4)
    /// — producing a mapping that can never observe writes recorded after
    /// that boundary. The replayed mapping carries no content hash (the
    /// TLog record format doesn't store one), so reads through it skip
    /// checksum verification; see [`Self::read_physical`].
    pub fn snapshot_view(self: &Arc<Self>, snapshot_name: &str) -> Result<Arc<dyn ParentLookup>, VolumeError> {
        let tlogs = self
            .state
            .read()
            .snapshots
            .tlogs_in_range(None, snapshot_name)
            .map_err(error::from_snapshot)?;

        let mut builder = vd_metadata::MetaDataStoreBuilder::new(Arc::new(vd_metadata::InMemoryBackend::new()), 64)
            .map_err(error::from_metadata)?;
        for tlog_id in tlogs {
            vd_tlog::fold_clusters(&self.tlog_storage, tlog_id, |ca, loc| {
                builder.replay_cluster(ca, loc).expect("in-memory metadata backend never fails");
            })
            .map_err(error::from_tlog)?;
        }

        Ok(Arc::new(SnapshotParent {
            volume: Arc::clone(self),
            frozen: builder.finish(),
        }))
    }
}

/// A [`ParentLookup`] bound to one ancestor volume's state as of a
/// particular snapshot; see [`Volume::snapshot_view`].
struct SnapshotParent<S: ScoStorage, TS: TLogStorage, B: BackendIface> {
    volume: Arc<Volume<S, TS, B>>,
    frozen: MetaDataStore,
}

impl<S: ScoStorage, TS: TLogStorage, B: BackendIface> ParentLookup for SnapshotParent<S, TS, B> {
    fn read_for_descendant(&self, ca: ClusterAddress, cluster_size: u64) -> Result<Option<Vec<u8>>, VolumeError> {
        let cfg = self.volume.config.read().clone();
        debug_assert_eq!(cfg.cluster_size(), cluster_size, "clone lineage must share cluster geometry");

        if let Some((loc, _hash)) = self.frozen.get(ca).map_err(error::from_metadata)? {
            let mut buf = vec![0u8; cluster_size as usize];
            self.volume.read_physical(loc, None, &mut buf, &cfg)?;
            return Ok(Some(buf));
        }
        match &self.volume.parent {
            Some(parent) => parent.read_for_descendant(ca, cluster_size),
            None => Ok(None),
        }
    }
}
