use vd_core::SconId;

use crate::error::FailOverError;
use crate::protocol::FocEntry;

/// Server-side durable append-only store, one per namespace (spec §4.3:
/// "keeps one durable append-only per-namespace store, memory or directory
/// of files").
pub trait FailOverStore: Send + Sync {
    fn add_entries(&self, namespace: &str, entries: Vec<FocEntry>) -> Result<(), FailOverError>;
    fn entries(&self, namespace: &str) -> Result<Vec<FocEntry>, FailOverError>;
    fn entries_for_sco(&self, namespace: &str, sco: SconId) -> Result<Vec<FocEntry>, FailOverError>;
    fn clear(&self, namespace: &str) -> Result<(), FailOverError>;
    /// Discard all entries whose SCONumber <= `sco` (spec §4.3).
    fn remove_up_to(&self, namespace: &str, sco: SconId) -> Result<(), FailOverError>;
    fn sco_range(&self, namespace: &str) -> Result<(Option<SconId>, Option<SconId>), FailOverError>;
}

pub mod mem {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemStore {
        namespaces: Mutex<HashMap<String, Vec<FocEntry>>>,
    }

    impl MemStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl FailOverStore for MemStore {
        fn add_entries(&self, namespace: &str, mut entries: Vec<FocEntry>) -> Result<(), FailOverError> {
            self.namespaces.lock().entry(namespace.to_string()).or_default().append(&mut entries);
            Ok(())
        }

        fn entries(&self, namespace: &str) -> Result<Vec<FocEntry>, FailOverError> {
            Ok(self.namespaces.lock().get(namespace).cloned().unwrap_or_default())
        }

        fn entries_for_sco(&self, namespace: &str, sco: SconId) -> Result<Vec<FocEntry>, FailOverError> {
            Ok(self
                .namespaces
                .lock()
                .get(namespace)
                .map(|entries| entries.iter().filter(|e| e.location.sco == sco).cloned().collect())
                .unwrap_or_default())
        }

        fn clear(&self, namespace: &str) -> Result<(), FailOverError> {
            self.namespaces.lock().remove(namespace);
            Ok(())
        }

        fn remove_up_to(&self, namespace: &str, sco: SconId) -> Result<(), FailOverError> {
            if let Some(entries) = self.namespaces.lock().get_mut(namespace) {
                entries.retain(|e| e.location.sco.0 > sco.0);
            }
            Ok(())
        }

        fn sco_range(&self, namespace: &str) -> Result<(Option<SconId>, Option<SconId>), FailOverError> {
            let namespaces = self.namespaces.lock();
            let Some(entries) = namespaces.get(namespace) else {
                return Ok((None, None));
            };
            let oldest = entries.iter().map(|e| e.location.sco.0).min().map(SconId);
            let youngest = entries.iter().map(|e| e.location.sco.0).max().map(SconId);
            Ok((oldest, youngest))
        }
    }
}
