//! Optimistic transactions over [`MemoryStore`].
//!
//! Reads go through the wrapped store and remember the first value seen per
//! key; writes are buffered. Commit re-validates every remembered read under
//! the store lock and applies the buffer only if nothing changed meanwhile.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use sharedlog_core::{ConditionalStore, StoreError, Transaction, Transactional};

use crate::memory::MemoryStore;

#[derive(Debug, Default)]
struct TxState {
    active: bool,
    reads: HashMap<String, Option<Vec<u8>>>,
    writes: HashMap<String, Option<Vec<u8>>>,
}

impl TxState {
    fn reset(&mut self, active: bool) {
        self.active = active;
        self.reads.clear();
        self.writes.clear();
    }
}

/// Creates [`MemoryTransaction`]s against one store.
#[derive(Clone)]
pub struct MemoryTransactions {
    store: Arc<MemoryStore>,
}

impl MemoryTransactions {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryTransactions { store }
    }
}

impl Transactional for MemoryTransactions {
    fn new_transaction(&self) -> Box<dyn Transaction> {
        Box::new(MemoryTransaction::new(self.store.clone()))
    }
}

/// One optimistic transaction.
pub struct MemoryTransaction {
    store: Arc<MemoryStore>,
    state: Arc<Mutex<TxState>>,
}

impl MemoryTransaction {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryTransaction {
            store,
            state: Arc::new(Mutex::new(TxState::default())),
        }
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        self.state.lock().writes.len()
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    /// Reads go through `store`, while commit validates and writes against
    /// the [`MemoryStore`] this transaction was created for. `store` has to
    /// be that same `MemoryStore` or a layer on top of it; wrapping an
    /// unrelated store validates reads against data they never came from.
    fn wrap(&self, store: Arc<dyn ConditionalStore>) -> Arc<dyn ConditionalStore> {
        Arc::new(TransactionalView {
            inner: store,
            state: self.state.clone(),
        })
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        self.state.lock().reset(true);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let (reads, writes) = {
            let mut state = self.state.lock();
            if !state.active {
                return Err(StoreError::TransactionNotActive);
            }
            state.active = false;
            (
                std::mem::take(&mut state.reads),
                std::mem::take(&mut state.writes),
            )
        };
        let write_count = writes.len();
        self.store.apply_if_unchanged(&reads, writes)?;
        debug!(reads = reads.len(), writes = write_count, "transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.active {
            return Err(StoreError::TransactionNotActive);
        }
        trace!(writes = state.writes.len(), "transaction rolled back");
        state.reset(false);
        Ok(())
    }
}

/// Store view whose calls join the owning transaction.
struct TransactionalView {
    inner: Arc<dyn ConditionalStore>,
    state: Arc<Mutex<TxState>>,
}

impl TransactionalView {
    fn ensure_active(&self) -> Result<(), StoreError> {
        if self.state.lock().active {
            Ok(())
        } else {
            Err(StoreError::TransactionNotActive)
        }
    }

    fn buffer(&self, key: &str, value: Option<Vec<u8>>) {
        self.state.lock().writes.insert(key.to_string(), value);
    }
}

#[async_trait]
impl ConditionalStore for TransactionalView {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_active()?;
        if let Some(buffered) = self.state.lock().writes.get(key) {
            return Ok(buffered.clone());
        }

        let value = self.inner.get(key).await?;
        self.state
            .lock()
            .reads
            .entry(key.to_string())
            .or_insert_with(|| value.clone());
        Ok(value)
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.buffer(key, Some(value.to_vec()));
        Ok(true)
    }

    async fn replace(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
    ) -> Result<bool, StoreError> {
        match self.get(key).await? {
            Some(current) if current == expected => {
                self.buffer(key, Some(value.to_vec()));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        match self.get(key).await? {
            Some(current) if current == expected => {
                self.buffer(key, None);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
