use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::log_value::{OperationId, WorkerId};
use crate::operation::Operation;

/// Key-value store offering single-key conditional updates.
///
/// Values are opaque bytes; expected values are compared byte for byte.
#[async_trait]
pub trait ConditionalStore: Send + Sync + 'static {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` only if `key` holds nothing. Returns true if written.
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError>;

    /// Swap in `value` only if `key` currently holds `expected`.
    async fn replace(&self, key: &str, expected: &[u8], value: &[u8])
        -> Result<bool, StoreError>;

    /// Remove `key` only if it currently holds `expected`.
    async fn remove(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;
}

/// Answers how far checkers got in confirming a stressor's operations.
#[async_trait]
pub trait QuorumOracle: Send + Sync + 'static {
    /// Highest operation id of `worker` that every checker has confirmed.
    ///
    /// `since` is the lowest id the caller is interested in (its own entry in
    /// the value being compacted); implementations may use it to wait for
    /// slow checkers or to short-circuit.
    async fn checked_operation_floor(
        &self,
        worker: WorkerId,
        since: Option<OperationId>,
    ) -> Result<OperationId, StoreError>;
}

/// Source of transactions grouping several store calls.
pub trait Transactional: Send + Sync + 'static {
    fn new_transaction(&self) -> Box<dyn Transaction>;
}

/// A single unit of work. The owner begins it, runs operations through the
/// wrapped store, and finally commits or rolls back.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// View of `store` whose calls take part in this transaction.
    ///
    /// `store` must read from the same data the transaction commits into,
    /// either that store itself or layers stacked on top of it.
    fn wrap(&self, store: Arc<dyn ConditionalStore>) -> Arc<dyn ConditionalStore>;

    async fn begin(&mut self) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Sink for per-call latency and outcome.
pub trait OperationRecorder: Send + Sync + 'static {
    /// The call returned normally. `hit` tells whether a value was found
    /// (reads) or the precondition matched (conditional writes).
    fn record_success(&self, elapsed: Duration, operation: Operation, hit: bool);

    /// The call failed, `operation` being the kind that was attempted.
    fn record_error(&self, elapsed: Duration, operation: Operation);
}
