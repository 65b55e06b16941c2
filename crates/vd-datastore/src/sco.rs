use std::io::{Read, Seek, SeekFrom, Write};

use vd_core::SconId;

use crate::error::DataStoreError;
use crate::storage::Durable;

/// Trailing per-SCO checksum record (spec §6 "SCO layout": "then a fixed
/// trailer with per-SCO CRC"). Little-endian, fixed 8 bytes: the number of
/// clusters actually written (a sealed-early SCO, e.g. at a snapshot
/// boundary, may hold fewer than `sco_multiplier`) followed by the running
/// CRC32C over every payload byte.
pub const TRAILER_LEN: usize = 8;

pub fn write_trailer(out: &mut impl Write, clusters_written: u32, crc: u32) -> std::io::Result<()> {
    out.write_all(&clusters_written.to_le_bytes())?;
    out.write_all(&crc.to_le_bytes())
}

pub fn read_trailer(input: &mut impl Read) -> std::io::Result<(u32, u32)> {
    let mut buf = [0u8; TRAILER_LEN];
    input.read_exact(&mut buf)?;
    let clusters_written = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let crc = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    Ok((clusters_written, crc))
}

/// A SCO currently open for appending within a single `DataStore`.
pub struct OpenSco<F> {
    pub sco: SconId,
    pub file: F,
    pub clusters_written: u32,
    pub running_crc: u32,
}

impl<F: Read + Write + Seek + Durable> OpenSco<F> {
    pub fn append_cluster(&mut self, data: &[u8]) -> Result<u8, DataStoreError> {
        let offset = self.clusters_written;
        self.file.write_all(data)?;
        self.running_crc = crc32c::crc32c_append(self.running_crc, data);
        self.clusters_written += 1;
        Ok(offset as u8)
    }

    pub fn read_cluster(&mut self, offset: u8, cluster_size: u64, buf: &mut [u8]) -> Result<(), DataStoreError> {
        self.file.seek(SeekFrom::Start(offset as u64 * cluster_size))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Flush buffered writes and force them to stable storage (spec §4.1
    /// "Sync": "flush open SCO to disk").
    pub fn sync(&mut self) -> Result<(), DataStoreError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
