use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{KeyValueStore, StorageError};

/// In-process store. Nothing survives the process, but a clone of the
/// same `Arc<MemoryStore>` survives a `SessionManager` being rebuilt,
/// which is how tests simulate a restart.
///
/// Failures can be injected to exercise rollback and restore paths.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    failing_sets: AtomicU32,
    fail_reads: AtomicBool,
    fail_removes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `count` calls to `set` fail
    pub fn fail_next_sets(&self, count: u32) {
        self.failing_sets.store(count, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    fn take_set_failure(&self) -> bool {
        self.failing_sets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("read of {key} failed")));
        }
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.take_set_failure() {
            return Err(StorageError::Unavailable(format!("write of {key} failed")));
        }
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("remove of {key} failed")));
        }
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(!store.contains("k"));
    }

    #[test]
    fn test_fail_next_sets_counts_down() {
        let store = MemoryStore::new();
        store.fail_next_sets(2);
        assert!(store.set("k", "v").is_err());
        assert!(store.set("k", "v").is_err());
        assert!(store.set("k", "v").is_ok());
    }

    #[test]
    fn test_fail_reads_and_removes() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();
        store.fail_reads(true);
        assert!(store.get("k").is_err());
        store.fail_reads(false);
        store.fail_removes(true);
        assert!(store.remove("k").is_err());
        assert!(store.contains("k"));
    }
}
