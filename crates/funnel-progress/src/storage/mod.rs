//! Key-value storage backends for funnel-progress.
//!
//! The funnel store persists a single JSON payload through the
//! [`KeyValueStorage`] trait, which mirrors the shape of a browser's local
//! storage: string keys, string values, synchronous access. Two backends
//! are provided:
//!
//! - [`MemoryStorage`]: an in-process map shared by cloned handles
//! - [`SqliteStorage`]: a durable `SQLite` table shared across processes

pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

use crate::config::{Config, StorageBackend};
use crate::error::Result;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Synchronous string key-value storage.
///
/// Every method may fail: storage can be disabled, over quota, or otherwise
/// inaccessible. Callers decide how to degrade.
pub trait KeyValueStorage: Send + Sync + std::fmt::Debug {
    /// Get the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Remove every key.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn clear(&self) -> Result<()>;
}

impl<S: KeyValueStorage + ?Sized> KeyValueStorage for Arc<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// Open the storage backend selected by `config`.
///
/// # Errors
///
/// Returns an error if the `SQLite` database cannot be opened.
pub fn open(config: &Config) -> Result<Arc<dyn KeyValueStorage>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory funnel storage");
            Ok(Arc::new(MemoryStorage::with_quota(
                config.storage.quota_bytes,
            )))
        }
        StorageBackend::Sqlite => {
            let storage = SqliteStorage::open(config.database_path())?;
            Ok(Arc::new(storage.with_quota(config.storage.quota_bytes)))
        }
    }
}

/// Compute the bytes a key-value pair counts against a quota.
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_backend() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;

        let storage = open(&config).unwrap();
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_open_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.database_path = Some(dir.path().join("funnel.db"));

        let storage = open(&config).unwrap();
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_arc_forwards_to_inner() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        storage.set_item("a", "1").unwrap();
        storage.remove_item("a").unwrap();
        assert!(storage.get_item("a").unwrap().is_none());
    }

    #[test]
    fn test_entry_size() {
        assert_eq!(entry_size("key", "value"), 8);
        assert_eq!(entry_size("", ""), 0);
    }
}
