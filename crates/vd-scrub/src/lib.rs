//! Scrubber + Apply: produce a rewrite plan for a snapshot range and apply it
//! to a volume or clone idempotently (spec §4.6).
//!
//! Grounded on `vd_metadata`'s `apply_relocations` contract for the
//! all-or-nothing apply semantics, and on `DataStore`'s SCO trailer format
//! for the compacted SCOs the scrubber writes.

mod apply;
mod error;
mod scrubber;
mod work;

pub use apply::apply_scrub_reply;
pub use error::ScrubError;
pub use scrubber::Scrubber;
pub use work::{LiveCluster, ScrubReply, ScrubResultPayload, ScrubWork, TLogRewrite};
