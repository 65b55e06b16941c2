use std::collections::HashMap;

use parking_lot::RwLock;
use vd_core::Weed;

use crate::{BackendError, BackendIface, BackendRequestParameters, ObjectMeta};

#[derive(Default)]
struct Namespace {
    objects: HashMap<String, Vec<u8>>,
}

/// In-memory `BackendIface`, used by the volume driver's own test suite the
/// way `commitlog::repo::mem::Memory` stands in for a filesystem in
/// commitlog's tests.
#[derive(Default)]
pub struct Memory {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendIface for Memory {
    fn put(
        &self,
        namespace: &str,
        name: &str,
        data: &[u8],
        overwrite: bool,
        _params: BackendRequestParameters,
    ) -> Result<(), BackendError> {
        let mut namespaces = self.namespaces.write();
        let ns = namespaces
            .get_mut(namespace)
            .ok_or_else(|| BackendError::NamespaceGone(namespace.to_string()))?;
        if !overwrite && ns.objects.contains_key(name) {
            return Err(BackendError::AlreadyExists {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        ns.objects.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, namespace: &str, name: &str, _params: BackendRequestParameters) -> Result<Vec<u8>, BackendError> {
        let namespaces = self.namespaces.read();
        let ns = namespaces
            .get(namespace)
            .ok_or_else(|| BackendError::NamespaceGone(namespace.to_string()))?;
        ns.objects
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    fn get_range(
        &self,
        namespace: &str,
        name: &str,
        offset: u64,
        len: u64,
        params: BackendRequestParameters,
    ) -> Result<Vec<u8>, BackendError> {
        let full = self.get(namespace, name, params)?;
        let start = offset as usize;
        let end = (offset + len) as usize;
        if start > full.len() {
            return Ok(Vec::new());
        }
        Ok(full[start..end.min(full.len())].to_vec())
    }

    fn delete(&self, namespace: &str, name: &str, _params: BackendRequestParameters) -> Result<(), BackendError> {
        let mut namespaces = self.namespaces.write();
        let ns = namespaces
            .get_mut(namespace)
            .ok_or_else(|| BackendError::NamespaceGone(namespace.to_string()))?;
        ns.objects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    fn list(&self, namespace: &str, _params: BackendRequestParameters) -> Result<Vec<ObjectMeta>, BackendError> {
        let namespaces = self.namespaces.read();
        let ns = namespaces
            .get(namespace)
            .ok_or_else(|| BackendError::NamespaceGone(namespace.to_string()))?;
        Ok(ns
            .objects
            .iter()
            .map(|(name, data)| ObjectMeta {
                name: name.clone(),
                size: data.len() as u64,
                checksum: Some(Weed::of(data)),
            })
            .collect())
    }

    fn ensure_namespace(&self, namespace: &str) -> Result<(), BackendError> {
        self.namespaces.write().entry(namespace.to_string()).or_default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BackendRequestParameters {
        BackendRequestParameters::default()
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let be = Memory::new();
        be.ensure_namespace("ns").unwrap();
        be.put("ns", "obj", b"hello", false, params()).unwrap();
        assert_eq!(be.get("ns", "obj", params()).unwrap(), b"hello");
        be.delete("ns", "obj", params()).unwrap();
        assert!(matches!(be.get("ns", "obj", params()), Err(BackendError::NotFound { .. })));
    }

    #[test]
    fn overwrite_false_rejects_duplicate() {
        let be = Memory::new();
        be.ensure_namespace("ns").unwrap();
        be.put("ns", "obj", b"a", false, params()).unwrap();
        assert!(matches!(
            be.put("ns", "obj", b"b", false, params()),
            Err(BackendError::AlreadyExists { .. })
        ));
        be.put("ns", "obj", b"b", true, params()).unwrap();
        assert_eq!(be.get("ns", "obj", params()).unwrap(), b"b");
    }

    #[test]
    fn get_range_slices() {
        let be = Memory::new();
        be.ensure_namespace("ns").unwrap();
        be.put("ns", "obj", b"0123456789", false, params()).unwrap();
        assert_eq!(be.get_range("ns", "obj", 2, 4, params()).unwrap(), b"2345");
    }

    #[test]
    fn missing_namespace_is_gone_not_not_found() {
        let be = Memory::new();
        assert!(matches!(be.get("nope", "obj", params()), Err(BackendError::NamespaceGone(_))));
    }
}
