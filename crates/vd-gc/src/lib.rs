//! GarbageCollector: deferred deletion of unreferenced backend objects via a
//! retrying thread pool with per-namespace barriers (spec §4.7).
//!
//! Grounded on the same worker-pool-over-a-condvar shape as
//! `vd_backend_tasks::BackendTaskRunner`, widened to multiple concurrent
//! workers (one namespace claimed at a time each) since GC tasks, unlike
//! uploads, carry no cross-namespace ordering constraint.

mod collector;
mod error;
mod task;

pub use collector::GarbageCollector;
pub use error::GcError;
pub use task::Garbage;
