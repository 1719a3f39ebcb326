//! In-process key-value storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::{entry_size, KeyValueStorage};
use crate::error::{Error, Result};

/// A shared in-memory map.
///
/// Clones share the same underlying map, so every context built from a
/// clone sees the same data, the way tabs of one origin share local storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
    /// Maximum total bytes across all entries; 0 means unlimited.
    quota_bytes: usize,
}

impl MemoryStorage {
    /// Create an empty storage without a quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty storage that rejects writes past `quota_bytes`.
    ///
    /// A quota of 0 disables the limit.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: Arc::default(),
            quota_bytes,
        }
    }

    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_items()?.len())
    }

    /// Check if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read_items(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, String>>> {
        self.items
            .read()
            .map_err(|_| Error::internal("memory storage lock poisoned"))
    }

    fn write_items(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, String>>> {
        self.items
            .write()
            .map_err(|_| Error::internal("memory storage lock poisoned"))
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.write_items()?;

        if self.quota_bytes > 0 {
            let others: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let required = others + entry_size(key, value);
            if required > self.quota_bytes {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    required,
                    limit: self.quota_bytes,
                });
            }
        }

        trace!("memory storage set {} ({} bytes)", key, value.len());
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.write_items()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.write_items()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let storage = MemoryStorage::new();
        storage.set_item("a", "1").unwrap();
        assert_eq!(storage.get_item("a").unwrap().as_deref(), Some("1"));
        assert!(storage.get_item("b").unwrap().is_none());
    }

    #[test]
    fn test_clones_share_data() {
        let first = MemoryStorage::new();
        let second = first.clone();

        first.set_item("shared", "yes").unwrap();
        assert_eq!(second.get_item("shared").unwrap().as_deref(), Some("yes"));

        second.remove_item("shared").unwrap();
        assert!(first.get_item("shared").unwrap().is_none());
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let storage = MemoryStorage::new();
        assert!(storage.remove_item("nope").is_ok());
    }

    #[test]
    fn test_clear() {
        let storage = MemoryStorage::new();
        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "2").unwrap();
        assert_eq!(storage.len().unwrap(), 2);

        storage.clear().unwrap();
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let storage = MemoryStorage::with_quota(10);
        storage.set_item("k", "12345").unwrap();

        let err = storage.set_item("k", "1234567890").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("12345"));
    }

    #[test]
    fn test_quota_counts_other_keys() {
        let storage = MemoryStorage::with_quota(8);
        storage.set_item("a", "123").unwrap();
        assert!(storage.set_item("b", "1234").is_err());
        assert!(storage.set_item("b", "12").is_ok());
    }

    #[test]
    fn test_quota_replacing_key_does_not_double_count() {
        let storage = MemoryStorage::with_quota(6);
        storage.set_item("k", "12345").unwrap();
        assert!(storage.set_item("k", "54321").is_ok());
    }

    #[test]
    fn test_zero_quota_is_unlimited() {
        let storage = MemoryStorage::with_quota(0);
        let big = "x".repeat(100_000);
        assert!(storage.set_item("big", &big).is_ok());
    }
}
