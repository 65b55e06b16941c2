use std::fmt;

use serde::{Deserialize, Serialize};

/// Content hash of a single cluster, stored verbatim in [`crate::ClusterLocation`]
/// mappings (spec §9: "content hashes are 16-byte Weed values stored verbatim").
///
/// The name follows the original design's terminology for its content-defined
/// hash; the algorithm here is a fast, non-cryptographic mix suitable for
/// detecting accidental corruption and superseded writes, not for security.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weed(pub [u8; 16]);

impl Weed {
    pub const ZERO: Weed = Weed([0; 16]);

    /// Compute the content hash of `data`.
    pub fn of(data: &[u8]) -> Self {
        let lo = crc32c::crc32c(data);
        let hi = crc32c::crc32c_append(!lo, data);
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&lo.to_le_bytes());
        out[4..8].copy_from_slice(&hi.to_le_bytes());
        out[8..12].copy_from_slice(&(data.len() as u32).to_le_bytes());
        out[12..16].copy_from_slice(&crc32c::crc32c(&out[0..12]).to_le_bytes());
        Weed(out)
    }

    pub fn is_zero(&self) -> bool {
        *self == Weed::ZERO
    }
}

impl fmt::Debug for Weed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Weed(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_sensitive_to_content() {
        let a = Weed::of(b"bart");
        let b = Weed::of(b"bart");
        let c = Weed::of(b"arne");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_zero());
        assert!(Weed::ZERO.is_zero());
    }
}
