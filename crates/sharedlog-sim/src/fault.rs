use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sharedlog_core::{ConditionalStore, StoreError};
use tokio::sync::Mutex;

/// Prefix used in error messages to distinguish injected faults from real errors.
pub const FAULT_PREFIX: &str = "[fault-injected]";

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of failing a call before it reaches the store (0.0-1.0).
    pub error_rate: f64,
    /// Probability of corrupting a value returned by `get` (0.0-1.0).
    pub corruption_rate: f64,
}

/// Statistics about injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub fault_count: usize,
    pub corruption_count: usize,
}

/// A store wrapper that randomly fails calls and corrupts reads.
///
/// Failures are injected before the inner call, so a failed call never has
/// an effect on the store.
pub struct FaultyStore {
    inner: Arc<dyn ConditionalStore>,
    rng: Mutex<ChaCha8Rng>,
    config: FaultConfig,
    fault_count: AtomicUsize,
    corruption_count: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn ConditionalStore>, rng: ChaCha8Rng, config: FaultConfig) -> Self {
        FaultyStore {
            inner,
            rng: Mutex::new(rng),
            config,
            fault_count: AtomicUsize::new(0),
            corruption_count: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> FaultStats {
        FaultStats {
            fault_count: self.fault_count.load(Ordering::Relaxed),
            corruption_count: self.corruption_count.load(Ordering::Relaxed),
        }
    }

    async fn should_inject_error(&self) -> bool {
        if self.config.error_rate <= 0.0 {
            return false;
        }
        let roll: f64 = self.rng.lock().await.gen();
        roll < self.config.error_rate
    }

    async fn should_corrupt_read(&self) -> bool {
        if self.config.corruption_rate <= 0.0 {
            return false;
        }
        let roll: f64 = self.rng.lock().await.gen();
        roll < self.config.corruption_rate
    }

    /// Generate a random injected error (ConnectionFailed or Timeout).
    async fn injected_error(&self, operation: &str, key: &str) -> StoreError {
        self.fault_count.fetch_add(1, Ordering::Relaxed);
        let use_timeout: bool = self.rng.lock().await.gen();
        if use_timeout {
            StoreError::Timeout {
                operation: format!("{} {}", FAULT_PREFIX, operation),
                key: key.to_string(),
            }
        } else {
            StoreError::ConnectionFailed {
                store: format!("{} faulty", FAULT_PREFIX),
                source: Box::new(std::io::Error::other(format!(
                    "{} connection failed during {}",
                    FAULT_PREFIX, operation
                ))),
            }
        }
    }

    /// Flip one bit of the leading byte; the result never decodes.
    async fn corrupt_data(&self, mut data: Vec<u8>) -> Vec<u8> {
        if data.is_empty() {
            return data;
        }
        self.corruption_count.fetch_add(1, Ordering::Relaxed);
        let bit_idx = self.rng.lock().await.gen_range(0..8u8);
        data[0] ^= 1 << bit_idx;
        data
    }
}

#[async_trait]
impl ConditionalStore for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.should_inject_error().await {
            return Err(self.injected_error("get", key).await);
        }
        let Some(data) = self.inner.get(key).await? else {
            return Ok(None);
        };
        if self.should_corrupt_read().await {
            return Ok(Some(self.corrupt_data(data).await));
        }
        Ok(Some(data))
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        if self.should_inject_error().await {
            return Err(self.injected_error("put_if_absent", key).await);
        }
        self.inner.put_if_absent(key, value).await
    }

    async fn replace(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        if self.should_inject_error().await {
            return Err(self.injected_error("replace", key).await);
        }
        self.inner.replace(key, expected, value).await
    }

    async fn remove(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        if self.should_inject_error().await {
            return Err(self.injected_error("remove", key).await);
        }
        self.inner.remove(key, expected).await
    }
}

/// Check if an error was injected by the fault layer.
pub fn is_injected_fault(msg: &str) -> bool {
    msg.contains(FAULT_PREFIX)
}
