use serde::{Deserialize, Serialize};

/// Monotonic identifier of the current owner of a volume (spec §3 Invariant 5,
/// Glossary). `OwnerTag(0)` means "unowned"; writes against an unowned volume
/// or with a stale tag are rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerTag(pub u64);

impl OwnerTag {
    pub const NONE: OwnerTag = OwnerTag(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn next(self) -> OwnerTag {
        OwnerTag(self.0 + 1)
    }
}
