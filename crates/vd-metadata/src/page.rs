use vd_core::{ClusterLocation, Weed};

/// Number of contiguous `ClusterAddress`es per page: the caching and
/// write-back granularity of the store (spec §4.4).
pub const PAGE_SIZE: u64 = 1024;

/// Index of a page: `ca / PAGE_SIZE`.
pub type PageIndex = u64;

pub fn page_of(ca: u64) -> (PageIndex, usize) {
    ((ca / PAGE_SIZE), (ca % PAGE_SIZE) as usize)
}

/// One page of `PAGE_SIZE` cluster mappings. Entries are `None` for unmapped
/// CAs (Invariant 1: "or is unmapped (zeros)").
#[derive(Clone)]
pub struct Page {
    pub(crate) entries: Box<[Option<(ClusterLocation, Weed)>]>,
    pub(crate) dirty: bool,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            entries: vec![None; PAGE_SIZE as usize].into_boxed_slice(),
            dirty: false,
        }
    }

    pub fn get(&self, offset: usize) -> Option<(ClusterLocation, Weed)> {
        self.entries[offset]
    }

    pub fn set(&mut self, offset: usize, value: Option<(ClusterLocation, Weed)>) {
        self.entries[offset] = value;
        self.dirty = true;
    }

    /// Flat on-disk form: `PAGE_SIZE` entries, each a 1-byte presence flag
    /// followed by the 21-byte `(ClusterLocation, Weed)` pair (little-endian
    /// throughout, per spec §9).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PAGE_SIZE as usize * (1 + 4 + 1 + 1 + 16));
        for entry in self.entries.iter() {
            match entry {
                None => out.push(0),
                Some((loc, hash)) => {
                    out.push(1);
                    out.extend_from_slice(&loc.sco.0.to_le_bytes());
                    out.push(loc.clone_id.0);
                    out.push(loc.offset);
                    out.extend_from_slice(&hash.0);
                }
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut page = Page::empty();
        let stride = 1 + 4 + 1 + 1 + 16;
        for i in 0..PAGE_SIZE as usize {
            let base = i * stride;
            if base >= bytes.len() || bytes[base] == 0 {
                continue;
            }
            let sco = u32::from_le_bytes(bytes[base + 1..base + 5].try_into().unwrap());
            let clone_id = bytes[base + 5];
            let offset = bytes[base + 6];
            let mut hash = [0u8; 16];
            hash.copy_from_slice(&bytes[base + 7..base + 23]);
            page.entries[i] = Some((
                ClusterLocation::new(vd_core::SconId(sco), vd_core::CloneId(clone_id), offset),
                Weed(hash),
            ));
        }
        page.dirty = false;
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vd_core::{CloneId, SconId};

    #[test]
    fn page_of_splits_ca_correctly() {
        assert_eq!(page_of(0), (0, 0));
        assert_eq!(page_of(PAGE_SIZE), (1, 0));
        assert_eq!(page_of(PAGE_SIZE + 5), (1, 5));
    }

    #[test]
    fn page_bytes_roundtrip() {
        let mut page = Page::empty();
        page.set(3, Some((ClusterLocation::new(SconId(9), CloneId(0), 7), Weed::of(b"x"))));
        let bytes = page.to_bytes();
        let restored = Page::from_bytes(&bytes);
        assert_eq!(restored.get(3), page.get(3));
        assert_eq!(restored.get(0), None);
    }
}
