use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use vd_backend::{BackendError, BackendIface, BackendRequestParameters};

use crate::task::{backoff_for, Garbage, GcTask};

#[derive(Default)]
struct NamespaceQueue {
    queue: VecDeque<GcTask>,
    next_seq: u64,
    /// `None` until the first task for this namespace completes; `seq`
    /// starts at 0, so a bare `u64` couldn't distinguish "nothing has
    /// completed yet" from "task 0 completed".
    last_completed_seq: Option<u64>,
    busy: bool,
}

struct Inner {
    namespaces: HashMap<String, NamespaceQueue>,
    stopping: bool,
}

/// Deferred deletion of unreferenced backend objects (spec §4.7). A fixed
/// pool of worker threads claims one namespace at a time each, so deletes
/// within a namespace run strictly in FIFO order while distinct namespaces
/// proceed in parallel; a failing delete is requeued behind the namespace's
/// exponential backoff schedule rather than blocking the pool.
pub struct GarbageCollector {
    state: Arc<Mutex<Inner>>,
    wake: Arc<Condvar>,
    workers: Vec<JoinHandle<()>>,
}

impl GarbageCollector {
    pub fn spawn<B: BackendIface + 'static>(backend: Arc<B>, params: BackendRequestParameters, num_workers: usize) -> Self {
        let state = Arc::new(Mutex::new(Inner {
            namespaces: HashMap::new(),
            stopping: false,
        }));
        let wake = Arc::new(Condvar::new());

        let workers = (0..num_workers.max(1))
            .map(|_| {
                let state = state.clone();
                let wake = wake.clone();
                let backend = backend.clone();
                std::thread::spawn(move || worker_loop(backend, params, state, wake))
            })
            .collect();

        Self { state, wake, workers }
    }

    /// Append a delete task for `garbage.namespace` (spec §4.7 `queue`).
    pub fn queue(&self, garbage: Garbage) -> u64 {
        let mut state = self.state.lock();
        let ns = state.namespaces.entry(garbage.namespace.clone()).or_default();
        let seq = ns.next_seq;
        ns.next_seq += 1;
        ns.queue.push_back(GcTask {
            seq,
            namespace: garbage.namespace,
            names: garbage.names,
            attempt: 0,
            ready_at: Instant::now(),
        });
        self.wake.notify_all();
        seq
    }

    /// Block until every task queued before this call for `namespace` has
    /// finished, returning `true`, or `false` if the pool is stopping (spec
    /// §4.7 `barrier`).
    pub fn barrier(&self, namespace: &str) -> bool {
        let mut state = self.state.lock();
        let next_seq = state.namespaces.entry(namespace.to_string()).or_default().next_seq;
        if next_seq == 0 {
            // Nothing has ever been queued for this namespace.
            return true;
        }
        let target = next_seq - 1;
        loop {
            if state.stopping {
                return false;
            }
            let ns = state.namespaces.entry(namespace.to_string()).or_default();
            let front_past_target = ns.queue.front().map_or(true, |t| t.seq > target);
            let target_completed = ns.last_completed_seq.map_or(false, |s| s >= target);
            if !ns.busy && front_past_target && target_completed {
                return true;
            }
            self.wake.wait_for(&mut state, Duration::from_millis(50));
        }
    }

    pub fn shutdown(mut self) {
        self.state.lock().stopping = true;
        self.wake.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.state.lock().stopping = true;
        self.wake.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Claim the front task of some namespace that isn't already claimed by
/// another worker and whose backoff has elapsed. Marks that namespace busy
/// so no other worker touches it concurrently (preserves per-namespace
/// FIFO).
fn claim_ready_task(inner: &mut Inner) -> Option<(String, GcTask)> {
    let now = Instant::now();
    for (name, ns) in inner.namespaces.iter_mut() {
        if ns.busy {
            continue;
        }
        if let Some(front) = ns.queue.front() {
            if front.ready_at <= now {
                ns.busy = true;
                return Some((name.clone(), ns.queue.pop_front().unwrap()));
            }
        }
    }
    None
}

fn worker_loop<B: BackendIface>(backend: Arc<B>, params: BackendRequestParameters, state: Arc<Mutex<Inner>>, wake: Arc<Condvar>) {
    loop {
        let (namespace, task) = {
            let mut guard = state.lock();
            loop {
                if guard.stopping {
                    return;
                }
                if let Some(claimed) = claim_ready_task(&mut guard) {
                    break claimed;
                }
                wake.wait_for(&mut guard, Duration::from_millis(100));
            }
        };

        let mut remaining = Vec::new();
        let mut failed = false;
        for name in &task.names {
            match backend.delete(&namespace, name, params) {
                Ok(()) | Err(BackendError::NotFound { .. }) => {}
                Err(e) => {
                    log::warn!("gc: delete {namespace}/{name} failed (attempt {}): {e}", task.attempt);
                    remaining.push(name.clone());
                    failed = true;
                }
            }
        }

        let mut guard = state.lock();
        let ns = guard.namespaces.entry(namespace.clone()).or_default();
        ns.busy = false;
        if failed {
            let attempt = task.attempt + 1;
            ns.queue.push_front(GcTask {
                seq: task.seq,
                namespace,
                names: remaining,
                attempt,
                ready_at: Instant::now() + backoff_for(attempt),
            });
        } else {
            ns.last_completed_seq = Some(ns.last_completed_seq.map_or(task.seq, |s| s.max(task.seq)));
        }
        drop(guard);
        wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use vd_backend::mem::Memory;
    use vd_backend::{BackendError, ObjectMeta};

    use super::*;
    use crate::task::Garbage;

    /// Wraps [`Memory`] and sleeps before every `delete`, widening the
    /// pop-then-run window `barrier` must not race ahead of.
    struct SlowDelete {
        inner: Memory,
        delay: Duration,
    }

    impl BackendIface for SlowDelete {
        fn put(&self, namespace: &str, name: &str, data: &[u8], overwrite: bool, params: BackendRequestParameters) -> Result<(), BackendError> {
            self.inner.put(namespace, name, data, overwrite, params)
        }
        fn get(&self, namespace: &str, name: &str, params: BackendRequestParameters) -> Result<Vec<u8>, BackendError> {
            self.inner.get(namespace, name, params)
        }
        fn get_range(&self, namespace: &str, name: &str, offset: u64, len: u64, params: BackendRequestParameters) -> Result<Vec<u8>, BackendError> {
            self.inner.get_range(namespace, name, offset, len, params)
        }
        fn delete(&self, namespace: &str, name: &str, params: BackendRequestParameters) -> Result<(), BackendError> {
            std::thread::sleep(self.delay);
            self.inner.delete(namespace, name, params)
        }
        fn list(&self, namespace: &str, params: BackendRequestParameters) -> Result<Vec<ObjectMeta>, BackendError> {
            self.inner.list(namespace, params)
        }
        fn ensure_namespace(&self, namespace: &str) -> Result<(), BackendError> {
            self.inner.ensure_namespace(namespace)
        }
    }

    fn backend_with_ns(ns: &str) -> Arc<Memory> {
        let backend = Arc::new(Memory::new());
        backend.ensure_namespace(ns).unwrap();
        backend
    }

    #[test]
    fn deletes_queued_objects() {
        let backend = backend_with_ns("ns0");
        backend.put("ns0", "a", b"1", false, BackendRequestParameters::default()).unwrap();
        backend.put("ns0", "b", b"2", false, BackendRequestParameters::default()).unwrap();
        let gc = GarbageCollector::spawn(backend.clone(), BackendRequestParameters::default(), 2);
        gc.queue(Garbage {
            namespace: "ns0".into(),
            names: vec!["a".into(), "b".into()],
        });
        assert!(gc.barrier("ns0"));
        assert!(backend.get("ns0", "a", BackendRequestParameters::default()).is_err());
        assert!(backend.get("ns0", "b", BackendRequestParameters::default()).is_err());
        gc.shutdown();
    }

    #[test]
    fn delete_of_already_missing_object_is_not_an_error() {
        let backend = backend_with_ns("ns0");
        let gc = GarbageCollector::spawn(backend, BackendRequestParameters::default(), 1);
        gc.queue(Garbage {
            namespace: "ns0".into(),
            names: vec!["never_existed".into()],
        });
        assert!(gc.barrier("ns0"));
        gc.shutdown();
    }

    /// Regression for the pop-then-run race: `barrier` must not report done
    /// while the sole queued task has been popped off the queue but is
    /// still inside `backend.delete` (spec §8 property 5 / scenario (f)).
    #[test]
    fn barrier_waits_for_in_flight_task_not_just_an_empty_queue() {
        let backend = Arc::new(SlowDelete {
            inner: Memory::new(),
            delay: Duration::from_millis(150),
        });
        backend.ensure_namespace("ns0").unwrap();
        backend.put("ns0", "a", b"1", false, BackendRequestParameters::default()).unwrap();
        let gc = GarbageCollector::spawn(backend.clone(), BackendRequestParameters::default(), 1);
        gc.queue(Garbage {
            namespace: "ns0".into(),
            names: vec!["a".into()],
        });
        // Give the single worker time to pop the task and enter the sleeping
        // delete (queue is now empty, task still in flight) before the
        // barrier call below observes state.
        std::thread::sleep(Duration::from_millis(50));
        assert!(gc.barrier("ns0"));
        assert!(backend.get("ns0", "a", BackendRequestParameters::default()).is_err());
        gc.shutdown();
    }

    #[test]
    fn barrier_on_empty_namespace_returns_true_immediately() {
        let backend = backend_with_ns("ns0");
        let gc = GarbageCollector::spawn(backend, BackendRequestParameters::default(), 1);
        assert!(gc.barrier("ns0"));
        gc.shutdown();
    }

    #[test]
    fn namespaces_progress_independently() {
        let backend = backend_with_ns("ns0");
        backend.ensure_namespace("ns1").unwrap();
        backend.put("ns0", "a", b"1", false, BackendRequestParameters::default()).unwrap();
        backend.put("ns1", "a", b"1", false, BackendRequestParameters::default()).unwrap();
        let gc = GarbageCollector::spawn(backend.clone(), BackendRequestParameters::default(), 2);
        gc.queue(Garbage {
            namespace: "ns0".into(),
            names: vec!["a".into()],
        });
        gc.queue(Garbage {
            namespace: "ns1".into(),
            names: vec!["a".into()],
        });
        assert!(gc.barrier("ns0"));
        assert!(gc.barrier("ns1"));
        assert!(backend.get("ns0", "a", BackendRequestParameters::default()).is_err());
        assert!(backend.get("ns1", "a", BackendRequestParameters::default()).is_err());
        gc.shutdown();
    }

    #[test]
    fn shutdown_stops_workers_with_a_permanently_failing_task_outstanding() {
        // Deleting from a namespace the backend never created fails every
        // attempt, so this task retries forever; shutdown must still join
        // the worker threads promptly rather than waiting on it to succeed.
        let backend = Arc::new(Memory::new());
        let gc = GarbageCollector::spawn(backend, BackendRequestParameters::default(), 1);
        gc.queue(Garbage {
            namespace: "ghost".into(),
            names: vec!["x".into()],
        });
        std::thread::sleep(Duration::from_millis(50));
        gc.shutdown();
    }
}
