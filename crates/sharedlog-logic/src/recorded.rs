use std::future::Future;
use std::time::Instant;

use sharedlog_core::{
    codec, CodecError, ConditionalStore, LogEntryMap, Operation, OperationRecorder, StoreError,
};

/// Raw bytes of one slot side with their decoded value.
pub(crate) struct SlotRead {
    pub(crate) raw: Option<Vec<u8>>,
    pub(crate) value: Result<Option<LogEntryMap>, CodecError>,
}

/// Store view that times every call and reports it to a recorder.
///
/// Errors are recorded under the kind that was attempted and passed through.
pub(crate) struct RecordedStore<'a> {
    store: &'a dyn ConditionalStore,
    recorder: &'a dyn OperationRecorder,
}

impl<'a> RecordedStore<'a> {
    pub(crate) fn new(
        store: &'a dyn ConditionalStore,
        recorder: &'a dyn OperationRecorder,
    ) -> Self {
        RecordedStore { store, recorder }
    }

    /// Read and decode one slot side. Bytes that do not decode are recorded
    /// as a failed Get, not as a hit.
    pub(crate) async fn get_slot(&self, key: &str) -> Result<SlotRead, StoreError> {
        let start = Instant::now();
        let result = self.store.get(key).await;
        let elapsed = start.elapsed();
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                self.recorder.record_error(elapsed, Operation::Get);
                return Err(e);
            }
        };
        let value = raw.as_deref().map(codec::decode).transpose();
        match &value {
            Ok(decoded) => self
                .recorder
                .record_success(elapsed, Operation::Get, decoded.is_some()),
            Err(_) => self.recorder.record_error(elapsed, Operation::Get),
        }
        Ok(SlotRead { raw, value })
    }

    pub(crate) async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        self.timed(
            Operation::PutIfAbsent,
            |written: &bool| *written,
            self.store.put_if_absent(key, value),
        )
        .await
    }

    pub(crate) async fn replace(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
    ) -> Result<bool, StoreError> {
        self.timed(
            Operation::Replace,
            |swapped: &bool| *swapped,
            self.store.replace(key, expected, value),
        )
        .await
    }

    pub(crate) async fn remove(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.timed(
            Operation::ConditionalRemove,
            |removed: &bool| *removed,
            self.store.remove(key, expected),
        )
        .await
    }

    async fn timed<T, F>(
        &self,
        operation: Operation,
        hit: impl Fn(&T) -> bool,
        call: F,
    ) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let start = Instant::now();
        let result = call.await;
        let elapsed = start.elapsed();
        match &result {
            Ok(value) => self.recorder.record_success(elapsed, operation, hit(value)),
            Err(_) => self.recorder.record_error(elapsed, operation),
        }
        result
    }
}
