use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use vd_backend::{with_retry, BackendIface, BackendRequestParameters};

use crate::error::BackendTaskError;
use crate::task::{Task, TaskKind};

struct NamespaceState {
    queue: VecDeque<Task>,
    completed: HashSet<String>,
    /// `None` until this namespace's first task completes; `seq` starts at
    /// 0, so a bare `u64` couldn't distinguish "nothing has completed yet"
    /// from "task 0 completed".
    last_completed_seq: Option<u64>,
    next_seq: u64,
    poison: Option<String>,
    /// Set while a task popped from this namespace's queue is running in
    /// `run_loop`, so `wait_until_drained` can't mistake "queue empty"
    /// (popped, not yet finished) for "drained".
    busy: bool,
}

impl Default for NamespaceState {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            completed: HashSet::new(),
            last_completed_seq: None,
            next_seq: 0,
            poison: None,
            busy: false,
        }
    }
}

struct Inner {
    namespaces: HashMap<String, NamespaceState>,
    stopping: bool,
}

/// Ordered per-namespace background upload queue (spec §4.8). A single
/// worker thread drains namespaces round-robin, skipping any namespace
/// whose front task isn't yet ready (its declared dependencies haven't
/// uploaded) and halting a namespace entirely once one of its tasks fails
/// permanently, until [`BackendTaskRunner::acknowledge_poison`] is called.
pub struct BackendTaskRunner {
    state: Arc<Mutex<Inner>>,
    wake: Arc<Condvar>,
    handle: Option<JoinHandle<()>>,
}

impl BackendTaskRunner {
    pub fn spawn<B: BackendIface + 'static>(backend: Arc<B>, params: BackendRequestParameters) -> Self {
        let state = Arc::new(Mutex::new(Inner {
            namespaces: HashMap::new(),
            stopping: false,
        }));
        let wake = Arc::new(Condvar::new());

        let worker_state = state.clone();
        let worker_wake = wake.clone();
        let handle = std::thread::spawn(move || run_loop(backend, params, worker_state, worker_wake));

        Self {
            state,
            wake,
            handle: Some(handle),
        }
    }

    /// Queue `kind` for upload in `namespace`; returns the namespace-local
    /// sequence number it was assigned (monotonic, used by
    /// [`Self::wait_until_drained`]).
    pub fn submit(&self, namespace: impl Into<String>, kind: TaskKind) -> u64 {
        let namespace = namespace.into();
        let mut state = self.state.lock();
        let ns = state.namespaces.entry(namespace.clone()).or_default();
        let seq = ns.next_seq;
        ns.next_seq += 1;
        ns.queue.push_back(Task { seq, namespace, kind });
        self.wake.notify_all();
        seq
    }

    /// Returns `Err` if `namespace` is currently poisoned by a task that
    /// failed permanently (spec §4.8 `checkConsistency`).
    pub fn check_consistency(&self, namespace: &str) -> Result<(), BackendTaskError> {
        let state = self.state.lock();
        match state.namespaces.get(namespace).and_then(|ns| ns.poison.clone()) {
            Some(source) => Err(BackendTaskError::Poisoned {
                namespace: namespace.to_string(),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Operator intervention: clear a namespace's poison and return the
    /// task that caused it, so the caller can decide whether to resubmit
    /// it (spec §4.8: "refuses to proceed past a poisoned task until
    /// operator intervention").
    pub fn acknowledge_poison(&self, namespace: &str) -> Option<Task> {
        let mut state = self.state.lock();
        let ns = state.namespaces.get_mut(namespace)?;
        ns.poison.take()?;
        let task = ns.queue.pop_front();
        self.wake.notify_all();
        task
    }

    /// Block until every task submitted for `namespace` before this call
    /// has completed, or the namespace becomes poisoned (returns the poison
    /// error) or the runner is shutting down.
    pub fn wait_until_drained(&self, namespace: &str) -> Result<(), BackendTaskError> {
        let mut state = self.state.lock();
        let next_seq = state.namespaces.entry(namespace.to_string()).or_default().next_seq;
        if next_seq == 0 {
            // Nothing has ever been submitted for this namespace.
            return Ok(());
        }
        let target = next_seq - 1;
        loop {
            if state.stopping {
                return Err(BackendTaskError::ShuttingDown);
            }
            let ns = state.namespaces.entry(namespace.to_string()).or_default();
            if let Some(source) = ns.poison.clone() {
                return Err(BackendTaskError::Poisoned {
                    namespace: namespace.to_string(),
                    source,
                });
            }
            let front_past_target = ns.queue.front().map_or(true, |t| t.seq > target);
            let target_completed = ns.last_completed_seq.map_or(false, |s| s >= target);
            if !ns.busy && front_past_target && target_completed {
                return Ok(());
            }
            self.wake.wait_for(&mut state, Duration::from_millis(50));
        }
    }

    pub fn shutdown(mut self) {
        self.state.lock().stopping = true;
        self.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BackendTaskRunner {
    fn drop(&mut self) {
        self.state.lock().stopping = true;
        self.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop<B: BackendIface>(backend: Arc<B>, params: BackendRequestParameters, state: Arc<Mutex<Inner>>, wake: Arc<Condvar>) {
    loop {
        let task = {
            let mut guard = state.lock();
            loop {
                if guard.stopping {
                    return;
                }
                if let Some(task) = pick_ready_task(&mut guard) {
                    break task;
                }
                wake.wait_for(&mut guard, Duration::from_millis(100));
            }
        };

        let result = with_retry(params.retries, Duration::from_millis(200), || {
            backend.put(&task.namespace, task.kind.object_name(), task.kind.data(), true, params)
        });

        let mut guard = state.lock();
        let ns = guard.namespaces.entry(task.namespace.clone()).or_default();
        ns.busy = false;
        match result {
            Ok(()) => {
                ns.completed.insert(task.kind.object_name().to_string());
                ns.last_completed_seq = Some(ns.last_completed_seq.map_or(task.seq, |s| s.max(task.seq)));
                log::debug!("backend-tasks: uploaded {}/{}", task.namespace, task.kind.object_name());
            }
            Err(e) => {
                log::error!(
                    "backend-tasks: permanent failure uploading {}/{}: {e}, namespace poisoned",
                    task.namespace,
                    task.kind.object_name()
                );
                ns.poison = Some(e.to_string());
            }
        }
        drop(guard);
        wake.notify_all();
    }
}

/// Pop the front task of the first namespace that has one ready to run:
/// not poisoned, and with its declared dependencies already completed.
/// Marks that namespace busy so `wait_until_drained` can see the task is
/// still in flight even once it's no longer sitting in the queue.
fn pick_ready_task(inner: &mut Inner) -> Option<Task> {
    for ns in inner.namespaces.values_mut() {
        if ns.poison.is_some() {
            continue;
        }
        match ns.queue.front() {
            Some(front) if front.is_ready(&ns.completed) => {
                ns.busy = true;
                return ns.queue.pop_front();
            }
            _ => continue,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vd_backend::mem::Memory;
    use vd_backend::{BackendError, BackendIface, ObjectMeta};

    use super::*;
    use crate::task::TaskKind;

    fn backend_with_ns(ns: &str) -> Arc<Memory> {
        let backend = Arc::new(Memory::new());
        backend.ensure_namespace(ns).unwrap();
        backend
    }

    /// Wraps [`Memory`] and sleeps before every `put`, widening the
    /// pop-then-run window `wait_until_drained` must not race ahead of.
    struct SlowPut {
        inner: Memory,
        delay: Duration,
    }

    impl BackendIface for SlowPut {
        fn put(&self, namespace: &str, name: &str, data: &[u8], overwrite: bool, params: BackendRequestParameters) -> Result<(), BackendError> {
            std::thread::sleep(self.delay);
            self.inner.put(namespace, name, data, overwrite, params)
        }
        fn get(&self, namespace: &str, name: &str, params: BackendRequestParameters) -> Result<Vec<u8>, BackendError> {
            self.inner.get(namespace, name, params)
        }
        fn get_range(&self, namespace: &str, name: &str, offset: u64, len: u64, params: BackendRequestParameters) -> Result<Vec<u8>, BackendError> {
            self.inner.get_range(namespace, name, offset, len, params)
        }
        fn delete(&self, namespace: &str, name: &str, params: BackendRequestParameters) -> Result<(), BackendError> {
            self.inner.delete(namespace, name, params)
        }
        fn list(&self, namespace: &str, params: BackendRequestParameters) -> Result<Vec<ObjectMeta>, BackendError> {
            self.inner.list(namespace, params)
        }
        fn ensure_namespace(&self, namespace: &str) -> Result<(), BackendError> {
            self.inner.ensure_namespace(namespace)
        }
    }

    #[test]
    fn sco_uploads_before_dependent_tlog() {
        let backend = backend_with_ns("ns0");
        let runner = BackendTaskRunner::spawn(backend.clone(), BackendRequestParameters::default());
        runner.submit(
            "ns0",
            TaskKind::UploadSco {
                name: "0_0".into(),
                data: vec![1, 2, 3],
            },
        );
        runner.submit(
            "ns0",
            TaskKind::UploadTlog {
                name: "tlog_a".into(),
                data: vec![4, 5, 6],
                depends_on_scos: vec!["0_0".into()],
            },
        );
        runner.wait_until_drained("ns0").unwrap();
        assert_eq!(backend.get("ns0", "0_0", BackendRequestParameters::default()).unwrap(), vec![1, 2, 3]);
        assert_eq!(
            backend.get("ns0", "tlog_a", BackendRequestParameters::default()).unwrap(),
            vec![4, 5, 6]
        );
        runner.shutdown();
    }

    #[test]
    fn tlog_waits_for_missing_dependency() {
        let backend = backend_with_ns("ns0");
        let runner = BackendTaskRunner::spawn(backend.clone(), BackendRequestParameters::default());
        runner.submit(
            "ns0",
            TaskKind::UploadTlog {
                name: "tlog_a".into(),
                data: vec![9],
                depends_on_scos: vec!["missing_sco".into()],
            },
        );
        std::thread::sleep(Duration::from_millis(150));
        assert!(backend.get("ns0", "tlog_a", BackendRequestParameters::default()).is_err());
        runner.shutdown();
    }

    #[test]
    fn permanent_failure_poisons_namespace() {
        // No namespace created: `put` returns NamespaceGone, a permanent error.
        let backend = Arc::new(Memory::new());
        let runner = BackendTaskRunner::spawn(backend, BackendRequestParameters::default());
        runner.submit(
            "ghost",
            TaskKind::WriteChecksum {
                name: "x".into(),
                data: vec![1],
            },
        );
        std::thread::sleep(Duration::from_millis(150));
        assert!(runner.check_consistency("ghost").is_err());
        runner.shutdown();
    }

    #[test]
    fn acknowledge_poison_clears_it_and_returns_the_task() {
        let backend = Arc::new(Memory::new());
        let runner = BackendTaskRunner::spawn(backend, BackendRequestParameters::default());
        runner.submit(
            "ghost",
            TaskKind::WriteChecksum {
                name: "x".into(),
                data: vec![1],
            },
        );
        std::thread::sleep(Duration::from_millis(150));
        assert!(runner.check_consistency("ghost").is_err());
        let task = runner.acknowledge_poison("ghost").unwrap();
        assert_eq!(task.kind.object_name(), "x");
        assert!(runner.check_consistency("ghost").is_ok());
        runner.shutdown();
    }

    /// Regression for the pop-then-run race: `wait_until_drained` must not
    /// report done while the sole submitted task has been popped off the
    /// queue but is still inside `backend.put` (consumed by `Volume::sync`
    /// before it releases SCOs/FailOverCache entries — spec Invariant 3).
    #[test]
    fn wait_until_drained_waits_for_in_flight_task_not_just_an_empty_queue() {
        let backend = Arc::new(SlowPut {
            inner: Memory::new(),
            delay: Duration::from_millis(150),
        });
        backend.ensure_namespace("ns0").unwrap();
        let runner = BackendTaskRunner::spawn(backend.clone(), BackendRequestParameters::default());
        runner.submit(
            "ns0",
            TaskKind::UploadSco {
                name: "0_0".into(),
                data: vec![1, 2, 3],
            },
        );
        // Give the single worker time to pop the task and enter the
        // sleeping put (queue now empty, task still in flight) before
        // wait_until_drained observes state.
        std::thread::sleep(Duration::from_millis(50));
        runner.wait_until_drained("ns0").unwrap();
        assert_eq!(backend.get("ns0", "0_0", BackendRequestParameters::default()).unwrap(), vec![1, 2, 3]);
        runner.shutdown();
    }

    #[test]
    fn drained_count_is_exact() {
        let backend = backend_with_ns("ns0");
        let runner = BackendTaskRunner::spawn(backend.clone(), BackendRequestParameters::default());
        let uploaded = Arc::new(AtomicUsize::new(0));
        for i in 0..5u32 {
            runner.submit(
                "ns0",
                TaskKind::UploadSco {
                    name: format!("{i}_0"),
                    data: vec![i as u8],
                },
            );
        }
        runner.wait_until_drained("ns0").unwrap();
        for i in 0..5u32 {
            assert!(backend
                .get("ns0", &format!("{i}_0"), BackendRequestParameters::default())
                .is_ok());
        }
        uploaded.store(5, Ordering::SeqCst);
        assert_eq!(uploaded.load(Ordering::SeqCst), 5);
        runner.shutdown();
    }
}
