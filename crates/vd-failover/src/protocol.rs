use std::io::{Read, Write};

use vd_core::{ClusterLocation, CloneId, Lba, SconId};

use crate::error::FailOverError;

/// Opcodes numbered 1..9 in the order listed (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Register = 1,
    Unregister = 2,
    AddEntries = 3,
    Flush = 4,
    Clear = 5,
    RemoveUpTo = 6,
    GetEntries = 7,
    GetSco = 8,
    GetScoRange = 9,
}

impl Opcode {
    pub fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            1 => Self::Register,
            2 => Self::Unregister,
            3 => Self::AddEntries,
            4 => Self::Flush,
            5 => Self::Clear,
            6 => Self::RemoveUpTo,
            7 => Self::GetEntries,
            8 => Self::GetSco,
            9 => Self::GetScoRange,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 1,
    NotOk = 2,
}

/// One cached write: the location it landed at, the LBA it was addressed by,
/// and the cluster bytes themselves (spec §6 `AddEntries` payload).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FocEntry {
    pub location: ClusterLocation,
    pub lba: Lba,
    pub data: Vec<u8>,
}

/// Sentinel marking the end of a `GetEntries`/`GetSCO` stream (spec §6:
/// "terminator = a zero ClusterLocation").
fn is_zero_location(loc: &ClusterLocation) -> bool {
    loc.sco.0 == 0 && loc.clone_id.0 == 0 && loc.offset == 0
}

pub fn write_frame(w: &mut impl Write, body: &[u8]) -> std::io::Result<()> {
    w.write_all(&(body.len() as u32).to_le_bytes())?;
    w.write_all(body)?;
    Ok(())
}

pub fn read_frame(r: &mut impl Read) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    Ok(body)
}

pub fn write_opcode(w: &mut impl Write, op: Opcode, payload: &[u8]) -> std::io::Result<()> {
    let mut body = Vec::with_capacity(1 + payload.len());
    body.push(op as u8);
    body.extend_from_slice(payload);
    write_frame(w, &body)
}

pub fn read_opcode(r: &mut impl Read) -> Result<(Opcode, Vec<u8>), FailOverError> {
    let body = read_frame(r)?;
    let tag = *body.first().ok_or_else(|| FailOverError::Protocol("empty frame".into()))?;
    let op = Opcode::from_u8(tag).ok_or_else(|| FailOverError::Protocol(format!("unknown opcode {tag}")))?;
    Ok((op, body[1..].to_vec()))
}

pub fn write_status(w: &mut impl Write, status: Status, payload: &[u8]) -> std::io::Result<()> {
    let mut body = Vec::with_capacity(1 + payload.len());
    body.push(status as u8);
    body.extend_from_slice(payload);
    write_frame(w, &body)
}

pub fn read_status(r: &mut impl Read) -> Result<(Status, Vec<u8>), FailOverError> {
    let body = read_frame(r)?;
    let tag = *body.first().ok_or_else(|| FailOverError::Protocol("empty frame".into()))?;
    let status = match tag {
        1 => Status::Ok,
        2 => Status::NotOk,
        _ => return Err(FailOverError::Protocol(format!("unknown status {tag}"))),
    };
    Ok((status, body[1..].to_vec()))
}

fn encode_location(loc: &ClusterLocation) -> [u8; 6] {
    let mut buf = [0u8; 6];
    buf[0..4].copy_from_slice(&loc.sco.0.to_le_bytes());
    buf[4] = loc.clone_id.0;
    buf[5] = loc.offset;
    buf
}

fn decode_location(buf: &[u8]) -> ClusterLocation {
    let sco = SconId(u32::from_le_bytes(buf[0..4].try_into().unwrap()));
    ClusterLocation::new(sco, CloneId(buf[4]), buf[5])
}

pub fn encode_add_entries(entries: &[FocEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for e in entries {
        out.extend_from_slice(&encode_location(&e.location));
        out.extend_from_slice(&e.lba.0.to_le_bytes());
        out.extend_from_slice(&(e.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&e.data);
    }
    out
}

pub fn decode_add_entries(buf: &[u8]) -> Result<Vec<FocEntry>, FailOverError> {
    let bad = || FailOverError::Protocol("truncated AddEntries payload".into());
    let count = u32::from_le_bytes(buf.get(0..4).ok_or_else(bad)?.try_into().unwrap());
    let mut pos = 4;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let location = decode_location(buf.get(pos..pos + 6).ok_or_else(bad)?);
        pos += 6;
        let lba = Lba(u64::from_le_bytes(buf.get(pos..pos + 8).ok_or_else(bad)?.try_into().unwrap()));
        pos += 8;
        let size = u32::from_le_bytes(buf.get(pos..pos + 4).ok_or_else(bad)?.try_into().unwrap()) as usize;
        pos += 4;
        let data = buf.get(pos..pos + size).ok_or_else(bad)?.to_vec();
        pos += size;
        entries.push(FocEntry { location, lba, data });
    }
    Ok(entries)
}

/// Encode a `GetEntries`/`GetSCO` response stream: each entry followed by a
/// final zero-`ClusterLocation` terminator.
pub fn encode_entry_stream(entries: &[FocEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for e in entries {
        out.extend_from_slice(&encode_location(&e.location));
        out.extend_from_slice(&e.lba.0.to_le_bytes());
        out.extend_from_slice(&(e.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&e.data);
    }
    out.extend_from_slice(&encode_location(&ClusterLocation::default()));
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

pub fn decode_entry_stream(buf: &[u8]) -> Result<Vec<FocEntry>, FailOverError> {
    let bad = || FailOverError::Protocol("truncated entry stream".into());
    let mut pos = 0;
    let mut entries = Vec::new();
    loop {
        let location = decode_location(buf.get(pos..pos + 6).ok_or_else(bad)?);
        pos += 6;
        let lba = Lba(u64::from_le_bytes(buf.get(pos..pos + 8).ok_or_else(bad)?.try_into().unwrap()));
        pos += 8;
        let size = u32::from_le_bytes(buf.get(pos..pos + 4).ok_or_else(bad)?.try_into().unwrap()) as usize;
        pos += 4;
        if is_zero_location(&location) {
            break;
        }
        let data = buf.get(pos..pos + size).ok_or_else(bad)?.to_vec();
        pos += size;
        entries.push(FocEntry { location, lba, data });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vd_core::SconId;

    fn entry(sco: u32, lba: u64, data: &[u8]) -> FocEntry {
        FocEntry {
            location: ClusterLocation::new(SconId(sco), CloneId(0), 0),
            lba: Lba(lba),
            data: data.to_vec(),
        }
    }

    #[test]
    fn add_entries_roundtrip() {
        let entries = vec![entry(1, 0, b"abc"), entry(1, 8, b"defg")];
        let encoded = encode_add_entries(&entries);
        let decoded = decode_add_entries(&encoded).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn entry_stream_roundtrip_with_terminator() {
        let entries = vec![entry(2, 0, b"xyz")];
        let encoded = encode_entry_stream(&entries);
        let decoded = decode_entry_stream(&encoded).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn frame_roundtrip_over_a_buffer() {
        let mut buf = Vec::new();
        write_opcode(&mut buf, Opcode::Flush, &[]).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let (op, payload) = read_opcode(&mut cursor).unwrap();
        assert_eq!(op, Opcode::Flush);
        assert!(payload.is_empty());
    }
}
