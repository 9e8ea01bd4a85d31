//! Reference-counted payload store.
//!
//! A publish fanning out to N subscribers stores its payload once; queues,
//! inflight slots and the dead-letter queue hold the id and a reference.
//! The entry drops when the last reference is released.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Debug)]
struct Entry {
    data: Bytes,
    refs: usize,
}

#[derive(Debug, Default)]
pub struct PayloadRegistry {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl PayloadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` with `refs` initial references and returns its id.
    /// Zero-reference stores are dropped immediately, so fan-outs with no
    /// matching subscribers never leak.
    #[must_use]
    pub fn store(&self, data: Vec<u8>, refs: usize) -> Option<Uuid> {
        if refs == 0 {
            return None;
        }
        let id = Uuid::new_v4();
        self.entries.write().insert(
            id,
            Entry {
                data: Bytes::from(data),
                refs,
            },
        );
        Some(id)
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Bytes> {
        self.entries.read().get(&id).map(|entry| entry.data.clone())
    }

    /// Adds one reference; no-op for unknown ids.
    pub fn retain(&self, id: Uuid) {
        if let Some(entry) = self.entries.write().get_mut(&id) {
            entry.refs += 1;
        }
    }

    /// Drops one reference, removing the payload at zero. Returns the
    /// remaining count, or `None` for unknown ids.
    pub fn release(&self, id: Uuid) -> Option<usize> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&id)?;
        entry.refs -= 1;
        if entry.refs == 0 {
            entries.remove(&id);
            return Some(0);
        }
        Some(entry.refs)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_fetch() {
        let registry = PayloadRegistry::new();
        let id = registry.store(vec![1, 2, 3], 1).unwrap();
        assert_eq!(registry.get(id).unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn zero_ref_store_is_dropped() {
        let registry = PayloadRegistry::new();
        assert!(registry.store(vec![1], 0).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn released_at_zero() {
        let registry = PayloadRegistry::new();
        let id = registry.store(vec![9], 2).unwrap();

        assert_eq!(registry.release(id), Some(1));
        assert!(registry.get(id).is_some());

        assert_eq!(registry.release(id), Some(0));
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn retain_extends_lifetime() {
        let registry = PayloadRegistry::new();
        let id = registry.store(vec![9], 1).unwrap();
        registry.retain(id);

        assert_eq!(registry.release(id), Some(1));
        assert!(registry.get(id).is_some());
        assert_eq!(registry.release(id), Some(0));
    }

    #[test]
    fn release_unknown_id() {
        let registry = PayloadRegistry::new();
        assert_eq!(registry.release(Uuid::new_v4()), None);
    }
}
