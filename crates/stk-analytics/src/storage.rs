//! Key-value browser storage seen through a trait.
//!
//! The host adapter provides two handles: a persistent one (`localStorage`)
//! and a tab-scoped one (`sessionStorage`). Every access is fallible and the
//! SDK treats any failure as "unavailable".

use crate::error::StorageError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const PROBE_KEY: &str = "__analytics_test__";

/// A string key-value store.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Probe the store with a write and a delete.
    fn is_available(&self) -> bool {
        self.set_item(PROBE_KEY, PROBE_KEY).is_ok() && self.remove_item(PROBE_KEY).is_ok()
    }
}

/// In-memory storage.
///
/// Clones share the same map, so a clone handed to a second
/// [`Analytics`](crate::Analytics) behaves like storage surviving a reload.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items().remove(key);
        Ok(())
    }
}

/// Storage that refuses every access, as in private browsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStorage;

impl Storage for UnavailableStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }
}

/// Best-effort access on top of a [`Storage`]: reads collapse errors to
/// `None`, writes report failure only as a debug log.
#[derive(Clone)]
pub(crate) struct BestEffort {
    inner: Arc<dyn Storage>,
    name: &'static str,
}

impl BestEffort {
    pub(crate) fn new(inner: Arc<dyn Storage>, name: &'static str) -> Self {
        Self { inner, name }
    }

    pub(crate) fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.inner.get_item(key).ok().flatten()
    }

    pub(crate) fn set(&self, key: &str, value: &str, debug: bool) {
        if let Err(e) = self.inner.set_item(key, value) {
            if debug {
                tracing::warn!(storage = self.name, key, error = %e, "storage write failed");
            }
        }
    }

    pub(crate) fn remove(&self, key: &str, debug: bool) {
        if let Err(e) = self.inner.remove_item(key) {
            if debug {
                tracing::warn!(storage = self.name, key, error = %e, "storage remove failed");
            }
        }
    }
}
