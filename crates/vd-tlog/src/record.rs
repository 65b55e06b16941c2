use std::io::{self, Read, Write};

use uuid::Uuid;
use vd_core::{ClusterAddress, ClusterLocation, CloneId, SconId};

use crate::error::TLogError;

const TAG_CLUSTER: u8 = 1;
const TAG_SYNC_TO_TC: u8 = 2;
const TAG_SCO_CRC: u8 = 3;
const TAG_TERMINATOR: u8 = 4;

/// Size of one on-disk record: a 1-byte tag plus a 16-byte payload (spec §6:
/// "fixed 16-byte records"; the tag byte is the on-disk discriminant that
/// decides how those 16 bytes are interpreted).
pub const RECORD_LEN: usize = 1 + 16;

/// One entry of a [`crate::TLogWriter`] (spec §3, §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TLogRecord {
    /// A single cluster write: `{CRC-of-cluster, CA, ClusterLocation}`.
    Cluster {
        crc: u32,
        ca: ClusterAddress,
        location: ClusterLocation,
    },
    /// Marks the point up to which `sync()` observed all prior writes
    /// durable (spec §4.1 "Sync", §8 invariant 6).
    SyncToTc { cork: Uuid },
    /// Marks that the preceding SCO was sealed with the given checksum.
    ScoCrc { sco: SconId, crc: u32 },
    /// Terminates the log: CRC of all preceding bytes.
    Terminator { crc: u32 },
}

impl TLogRecord {
    fn tag(&self) -> u8 {
        match self {
            TLogRecord::Cluster { .. } => TAG_CLUSTER,
            TLogRecord::SyncToTc { .. } => TAG_SYNC_TO_TC,
            TLogRecord::ScoCrc { .. } => TAG_SCO_CRC,
            TLogRecord::Terminator { .. } => TAG_TERMINATOR,
        }
    }

    pub fn encode(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&[self.tag()])?;
        let mut payload = [0u8; 16];
        match *self {
            TLogRecord::Cluster { crc, ca, location } => {
                payload[0..4].copy_from_slice(&crc.to_le_bytes());
                payload[4..12].copy_from_slice(&ca.0.to_le_bytes());
                payload[12..16].copy_from_slice(&pack_location(location).to_le_bytes());
            }
            TLogRecord::SyncToTc { cork } => {
                payload.copy_from_slice(cork.as_bytes());
            }
            TLogRecord::ScoCrc { sco, crc } => {
                payload[0..4].copy_from_slice(&sco.0.to_le_bytes());
                payload[4..8].copy_from_slice(&crc.to_le_bytes());
            }
            TLogRecord::Terminator { crc } => {
                payload[0..4].copy_from_slice(&crc.to_le_bytes());
            }
        }
        out.write_all(&payload)
    }

    /// Decode one record, or `Ok(None)` at a clean EOF (no bytes read at
    /// all), mirroring `commit::Header::decode`'s EOF handling.
    pub fn decode(input: &mut impl Read) -> io::Result<Option<Self>> {
        let mut tag = [0u8; 1];
        match input.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let mut payload = [0u8; 16];
        input.read_exact(&mut payload)?;

        let record = match tag[0] {
            TAG_CLUSTER => {
                let crc = u32::from_le_bytes(payload[0..4].try_into().unwrap());
                let ca = u64::from_le_bytes(payload[4..12].try_into().unwrap());
                let location = u32::from_le_bytes(payload[12..16].try_into().unwrap());
                TLogRecord::Cluster {
                    crc,
                    ca: ClusterAddress(ca),
                    location: unpack_location(location),
                }
            }
            TAG_SYNC_TO_TC => TLogRecord::SyncToTc {
                cork: Uuid::from_bytes(payload),
            },
            TAG_SCO_CRC => {
                let sco = u32::from_le_bytes(payload[0..4].try_into().unwrap());
                let crc = u32::from_le_bytes(payload[4..8].try_into().unwrap());
                TLogRecord::ScoCrc { sco: SconId(sco), crc }
            }
            TAG_TERMINATOR => {
                let crc = u32::from_le_bytes(payload[0..4].try_into().unwrap());
                TLogRecord::Terminator { crc }
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    TLogError::UnknownTag { tag: other },
                ))
            }
        };
        Ok(Some(record))
    }
}

/// Pack `(SCONumber:24, offset:8)` into a `u32`, as specified in spec §6. A
/// TLog only ever records entries in the volume's own lineage level, so
/// `clone_id` is not part of the wire form.
fn pack_location(loc: ClusterLocation) -> u32 {
    debug_assert!(loc.sco.0 <= 0x00FF_FFFF, "sco number must fit in 24 bits");
    (loc.sco.0 << 8) | loc.offset as u32
}

fn unpack_location(packed: u32) -> ClusterLocation {
    ClusterLocation::new(SconId(packed >> 8), CloneId(0), (packed & 0xFF) as u8)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn roundtrip(rec: TLogRecord) {
        let mut buf = Vec::new();
        rec.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), RECORD_LEN);
        let mut cur = Cursor::new(buf);
        let decoded = TLogRecord::decode(&mut cur).unwrap().unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn cluster_record_roundtrips() {
        roundtrip(TLogRecord::Cluster {
            crc: 0xdead_beef,
            ca: ClusterAddress(12345),
            location: ClusterLocation::new(SconId(77), CloneId(0), 200),
        });
    }

    #[test]
    fn marks_roundtrip() {
        roundtrip(TLogRecord::SyncToTc { cork: Uuid::new_v4() });
        roundtrip(TLogRecord::ScoCrc {
            sco: SconId(5),
            crc: 0x1234,
        });
        roundtrip(TLogRecord::Terminator { crc: 0x5678 });
    }

    #[test]
    fn decode_at_clean_eof_is_none() {
        let mut cur = Cursor::new(Vec::<u8>::new());
        assert!(TLogRecord::decode(&mut cur).unwrap().is_none());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut buf = vec![99u8];
        buf.extend_from_slice(&[0u8; 16]);
        let mut cur = Cursor::new(buf);
        assert!(TLogRecord::decode(&mut cur).is_err());
    }
}
