use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sharedlog_core::{ConditionalStore, StoreError};
use tokio::sync::Mutex;

/// Store wrapper sleeping a random time before every call.
///
/// Spreads the read and write of one attempt apart so concurrent workers
/// interleave between them and conditional writes start to fail.
pub struct DelayedStore {
    inner: Arc<dyn ConditionalStore>,
    rng: Mutex<ChaCha8Rng>,
    max_delay: Duration,
}

impl DelayedStore {
    pub fn new(inner: Arc<dyn ConditionalStore>, rng: ChaCha8Rng, max_delay: Duration) -> Self {
        DelayedStore {
            inner,
            rng: Mutex::new(rng),
            max_delay,
        }
    }

    async fn pause(&self) {
        let max_micros = self.max_delay.as_micros() as u64;
        if max_micros == 0 {
            return;
        }
        let micros = self.rng.lock().await.gen_range(0..=max_micros);
        tokio::time::sleep(Duration::from_micros(micros)).await;
    }
}

#[async_trait]
impl ConditionalStore for DelayedStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.pause().await;
        self.inner.get(key).await
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        self.pause().await;
        self.inner.put_if_absent(key, value).await
    }

    async fn replace(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        self.pause().await;
        self.inner.replace(key, expected, value).await
    }

    async fn remove(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.pause().await;
        self.inner.remove(key, expected).await
    }
}
