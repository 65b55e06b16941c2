use uuid::Uuid;

use crate::error::TLogError;
use crate::record::TLogRecord;
use crate::storage::{Durable, TLogStorage};

/// A TLog open for appending. Mirrors `commitlog::segment::Writer`'s shape
/// (buffered writes, tracked byte count, explicit `sync`) narrowed to the
/// fixed-record TLog format of spec §6.
pub struct TLogWriter<F> {
    id: Uuid,
    file: F,
    records_written: u64,
    /// Running CRC32C over every byte written so far, folded into the
    /// `Terminator` record on `finalize`.
    running_crc: u32,
    finalized: bool,
}

impl<F: std::io::Read + std::io::Write + std::io::Seek + Durable> TLogWriter<F> {
    pub fn create<S: TLogStorage<File = F>>(storage: &S, id: Uuid) -> Result<Self, TLogError> {
        let file = storage.create(id).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => TLogError::AlreadyExists(id),
            _ => TLogError::Io(e),
        })?;
        Ok(Self {
            id,
            file,
            records_written: 0,
            running_crc: 0,
            finalized: false,
        })
    }

    /// Resume an existing (unfinalized) TLog for appending, seeking to the
    /// end first.
    pub fn resume<S: TLogStorage<File = F>>(storage: &S, id: Uuid) -> Result<Self, TLogError> {
        let mut file = storage.open(id).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TLogError::NotFound(id),
            _ => TLogError::Io(e),
        })?;
        use std::io::Seek;
        file.seek(std::io::SeekFrom::End(0))?;
        Ok(Self {
            id,
            file,
            records_written: 0,
            running_crc: 0,
            finalized: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    fn append(&mut self, record: TLogRecord) -> Result<(), TLogError> {
        if self.finalized {
            return Err(TLogError::Finalized);
        }
        let mut buf = Vec::with_capacity(crate::record::RECORD_LEN);
        record.encode(&mut buf)?;
        self.running_crc = crc32c::crc32c_append(self.running_crc, &buf);
        self.file.write_all(&buf)?;
        self.records_written += 1;
        Ok(())
    }

    pub fn append_cluster(
        &mut self,
        crc: u32,
        ca: vd_core::ClusterAddress,
        location: vd_core::ClusterLocation,
    ) -> Result<(), TLogError> {
        self.append(TLogRecord::Cluster { crc, ca, location })
    }

    pub fn append_sco_crc(&mut self, sco: vd_core::SconId, crc: u32) -> Result<(), TLogError> {
        self.append(TLogRecord::ScoCrc { sco, crc })
    }

    pub fn append_sync_to_tc(&mut self, cork: Uuid) -> Result<(), TLogError> {
        self.append(TLogRecord::SyncToTc { cork })
    }

    /// Flush in-process buffers and force the TLog to stable storage
    /// (spec §4.1 "Sync": "flush open SCO to disk ... emit a SyncToTCMark").
    pub fn sync(&mut self) -> Result<(), TLogError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Write the terminating CRC record and sync. After this, the TLog is
    /// read-only (spec §3: "finalized on snapshot or rotation").
    pub fn finalize(mut self) -> Result<TLogSummary, TLogError> {
        let crc = self.running_crc;
        self.append(TLogRecord::Terminator { crc })?;
        self.sync()?;
        self.finalized = true;
        Ok(TLogSummary {
            id: self.id,
            records: self.records_written,
        })
    }
}

/// Summary returned once a TLog has been finalized.
#[derive(Clone, Copy, Debug)]
pub struct TLogSummary {
    pub id: Uuid,
    pub records: u64,
}
