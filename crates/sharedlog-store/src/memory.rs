use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use sharedlog_core::{ConditionalStore, StoreError};

/// In-memory conditional store for testing.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        MemoryStore {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Unconditionally store a value, bypassing every check.
    pub fn put(&self, key: &str, value: &[u8]) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_vec());
    }

    /// Read a value without going through the async interface.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of all keys.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<_> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Validate a transaction's read set and apply its writes atomically.
    ///
    /// `reads` holds the value each key had when the transaction first saw it;
    /// `writes` maps keys to their new value, `None` meaning removal.
    pub(crate) fn apply_if_unchanged(
        &self,
        reads: &HashMap<String, Option<Vec<u8>>>,
        writes: HashMap<String, Option<Vec<u8>>>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        for (key, observed) in reads {
            if entries.get(key) != observed.as_ref() {
                return Err(StoreError::TransactionConflict(key.clone()));
            }
        }

        for (key, value) in writes {
            match value {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConditionalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.peek(key))
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    async fn replace(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(key) {
            Some(current) if current.as_slice() == expected => {
                *current = value.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(key).is_some_and(|current| current.as_slice() == expected) {
            entries.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
