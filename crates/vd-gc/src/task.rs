use std::time::{Duration, Instant};

/// A batch of backend object names to delete from `namespace`, queued
/// together (spec §4.7 `queue(Garbage{namespace, names})`).
#[derive(Clone, Debug)]
pub struct Garbage {
    pub namespace: String,
    pub names: Vec<String>,
}

/// Exponential backoff schedule for a failing delete, in seconds (spec
/// §4.7: "0, 1, 2, 4, 8, 15, 30, 60, 120, 240, then 300 s cap").
const BACKOFF_SECONDS: &[u64] = &[0, 1, 2, 4, 8, 15, 30, 60, 120, 240, 300];

pub(crate) fn backoff_for(attempt: usize) -> Duration {
    let idx = attempt.min(BACKOFF_SECONDS.len() - 1);
    Duration::from_secs(BACKOFF_SECONDS[idx])
}

#[derive(Clone, Debug)]
pub(crate) struct GcTask {
    pub seq: u64,
    pub namespace: String,
    pub names: Vec<String>,
    pub attempt: usize,
    pub ready_at: Instant,
}
