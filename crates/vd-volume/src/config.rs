use std::time::Duration;

/// Parameters for (re)attaching a FailOverCache bridge (spec §4.3,
/// `setFailOverCacheConfig`). `None` at the `Volume::set_failover_cache_config`
/// call site detaches the current bridge and drops the volume to
/// `Ok_Standalone`.
#[derive(Clone, Debug)]
pub struct FailOverCacheConfig {
    pub addr: String,
    /// Per-request timeout before the bridge declares itself Degraded (spec
    /// §5 "Cancellation / timeouts": "default 5 s configurable").
    pub timeout: Duration,
}

impl Default for FailOverCacheConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            timeout: Duration::from_secs(5),
        }
    }
}
