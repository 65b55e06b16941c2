use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;
use vd_backend::{BackendIface, BackendRequestParameters};
use vd_core::{ClusterAddress, ClusterLocation, CloneId, SconId};
use vd_metadata::Relocation;

use crate::error::ScrubError;
use crate::work::{LiveCluster, ScrubReply, ScrubResultPayload, ScrubWork, TLogRewrite};

/// Produces a rewrite plan for a snapshot range (spec §4.6): folds the
/// range's cluster entries down to one location per CA, repacks the live
/// clusters into fresh, fully-occupied SCOs, and publishes the result.
///
/// Grounded on `DataStore`'s own SCO trailer format (payload then
/// `clusters_written:u32 | crc:u32`) so a compacted SCO is byte-identical in
/// shape to one written by the live write path.
pub struct Scrubber<B> {
    backend: Arc<B>,
    params: BackendRequestParameters,
}

impl<B: BackendIface> Scrubber<B> {
    pub fn new(backend: Arc<B>, params: BackendRequestParameters) -> Self {
        Self { backend, params }
    }

    /// Keep only the most recently written location for each CA across the
    /// range's cluster entries, in CA order.
    pub fn find_live_clusters(&self, entries: impl IntoIterator<Item = (ClusterAddress, ClusterLocation)>) -> Vec<LiveCluster> {
        let mut last: HashMap<ClusterAddress, ClusterLocation> = HashMap::new();
        for (ca, location) in entries {
            last.insert(ca, location);
        }
        let mut out: Vec<LiveCluster> = last
            .into_iter()
            .map(|(ca, old_location)| LiveCluster { ca, old_location })
            .collect();
        out.sort_by_key(|lc| lc.ca.0);
        out
    }

    /// Repack `live` into new, densely-packed SCOs of at most
    /// `sco_multiplier` clusters, fetching each old cluster's bytes from the
    /// backend and writing the new SCOs back. Returns the relocation plan
    /// and the list of newly-written SCO numbers.
    pub fn compact(
        &self,
        work: &ScrubWork,
        live: Vec<LiveCluster>,
        new_clone_id: CloneId,
        sco_multiplier: u32,
        mut next_sco: impl FnMut() -> SconId,
    ) -> Result<(Vec<Relocation>, Vec<SconId>), ScrubError> {
        let cluster_size = work.cluster_size();
        let mut relocations = Vec::with_capacity(live.len());
        let mut new_scos = Vec::new();
        let mut payload: Vec<u8> = Vec::new();
        let mut count_in_sco: u32 = 0;
        let mut crc: u32 = 0;
        let mut current_sco: Option<SconId> = None;

        for lc in live {
            if current_sco.is_none() || count_in_sco >= sco_multiplier {
                if let Some(sco) = current_sco.take() {
                    self.seal_new_sco(work, sco, new_clone_id, &payload, count_in_sco, crc)?;
                }
                let sco = next_sco();
                new_scos.push(sco);
                current_sco = Some(sco);
                payload.clear();
                count_in_sco = 0;
                crc = 0;
            }
            let sco = current_sco.expect("just assigned above");
            let offset = count_in_sco as u8;
            let bytes = self.fetch_cluster(work, &lc.old_location, cluster_size)?;
            crc = crc32c::crc32c_append(crc, &bytes);
            payload.extend_from_slice(&bytes);
            relocations.push(Relocation {
                ca: lc.ca,
                old_location: lc.old_location,
                new_location: ClusterLocation::new(sco, new_clone_id, offset),
            });
            count_in_sco += 1;
        }
        if let Some(sco) = current_sco {
            self.seal_new_sco(work, sco, new_clone_id, &payload, count_in_sco, crc)?;
        }
        Ok((relocations, new_scos))
    }

    fn fetch_cluster(&self, work: &ScrubWork, loc: &ClusterLocation, cluster_size: u64) -> Result<Vec<u8>, ScrubError> {
        let name = loc.sco_name();
        let offset = loc.offset as u64 * cluster_size;
        Ok(self.backend.get_range(&work.namespace, &name, offset, cluster_size, self.params)?)
    }

    fn seal_new_sco(
        &self,
        work: &ScrubWork,
        sco: SconId,
        clone_id: CloneId,
        payload: &[u8],
        clusters_written: u32,
        crc: u32,
    ) -> Result<(), ScrubError> {
        let mut out = Vec::with_capacity(payload.len() + 8);
        out.extend_from_slice(payload);
        out.extend_from_slice(&clusters_written.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        let name = ClusterLocation::new(sco, clone_id, 0).sco_name();
        self.backend.put(&work.namespace, &name, &out, false, self.params)?;
        log::debug!("scrub: sealed compacted sco {name} ({clusters_written} clusters)");
        Ok(())
    }

    /// Publish a `scrub_result_<uuid>` object and return the reply pointer
    /// the volume applies (spec §4.6, §6).
    pub fn produce(
        &self,
        work: &ScrubWork,
        relocations: Vec<Relocation>,
        new_tlogs: Vec<Uuid>,
        garbage: Vec<String>,
    ) -> Result<ScrubReply, ScrubError> {
        let payload = ScrubResultPayload {
            version: 2,
            relocations,
            tlog_rewrite: TLogRewrite {
                snapshot_name: work.snapshot_name.clone(),
                new_tlogs,
            },
            garbage,
        };
        let bytes = serde_json::to_vec(&payload)?;
        let scrub_result_name = format!("scrub_result_{}", Uuid::new_v4());
        self.backend.put(&work.namespace, &scrub_result_name, &bytes, false, self.params)?;
        Ok(ScrubReply {
            namespace: work.namespace.clone(),
            snapshot_name: work.snapshot_name.clone(),
            scrub_result_name,
        })
    }
}
