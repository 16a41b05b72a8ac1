use std::sync::Arc;
use std::time::Duration;

use sharedlog_config::StressConfig;
use sharedlog_core::{
    backup_key_id, codec, CodecError, ConditionalStore, KeyGenerator, LogEntryMap, Operation,
    OperationId, OperationRecorder, QuorumOracle, WorkerId,
};
use tracing::{debug, error, instrument, trace, warn};

use crate::checked::checked_operations;
use crate::control::WorkerControl;
use crate::error::LogicError;
use crate::recorded::RecordedStore;
use crate::stats::LogicStats;

/// Settings fixed for the lifetime of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicSettings {
    /// Entry count at which a merged value gets compacted.
    pub value_max_size: usize,
    /// Number of workers taking part in the run.
    pub worker_population: u32,
    /// Pause before retrying an attempt whose value could not be compacted.
    pub retry_backoff: Duration,
}

impl LogicSettings {
    pub fn from_config(config: &StressConfig) -> Self {
        LogicSettings {
            value_max_size: config.log_logic.value_max_size,
            worker_population: config.worker_population(),
            retry_backoff: config.log_logic.retry_backoff.as_duration(),
        }
    }
}

/// Which key of a slot receives the merged log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSide {
    Primary,
    Backup,
}

impl WriteSide {
    pub fn for_operation(operation: Operation) -> Result<Self, LogicError> {
        match operation {
            Operation::Put => Ok(WriteSide::Primary),
            Operation::Remove => Ok(WriteSide::Backup),
            other => Err(LogicError::UnsupportedOperation(other)),
        }
    }
}

/// Conditional remove of the side that was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCleanup {
    pub key: String,
    pub expected: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The fact is stored. `pending_cleanup` is set when the other side still
    /// holds a stale value that the caller should remove.
    Completed {
        pending_cleanup: Option<PendingCleanup>,
    },
    /// The worker was asked to stop before the fact could be stored.
    Abandoned,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }
}

/// Snapshot of one key as read at the start of an attempt.
struct SideSnapshot {
    key: String,
    raw: Option<Vec<u8>>,
}

/// Records the operations of one worker into dual-key slots.
pub struct SharedLogLogic {
    worker_id: WorkerId,
    settings: LogicSettings,
    keys: Arc<dyn KeyGenerator>,
    oracle: Arc<dyn QuorumOracle>,
    recorder: Arc<dyn OperationRecorder>,
    control: WorkerControl,
    stats: Arc<LogicStats>,
}

impl SharedLogLogic {
    pub fn new(
        worker_id: WorkerId,
        settings: LogicSettings,
        keys: Arc<dyn KeyGenerator>,
        oracle: Arc<dyn QuorumOracle>,
        recorder: Arc<dyn OperationRecorder>,
        control: WorkerControl,
    ) -> Self {
        SharedLogLogic {
            worker_id,
            settings,
            keys,
            oracle,
            recorder,
            control,
            stats: Arc::new(LogicStats::new()),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn control(&self) -> &WorkerControl {
        &self.control
    }

    pub fn stats(&self) -> Arc<LogicStats> {
        self.stats.clone()
    }

    /// Record `operation_id` on the slot of `key_id` and clean up the other
    /// side right away.
    pub async fn invoke(
        &self,
        store: &dyn ConditionalStore,
        key_id: i64,
        operation_id: OperationId,
        operation: Operation,
    ) -> Result<Outcome, LogicError> {
        let outcome = self.attempt(store, key_id, operation_id, operation).await?;
        if outcome.is_completed() {
            self.record_durable();
        }
        if let Outcome::Completed {
            pending_cleanup: Some(cleanup),
        } = &outcome
        {
            self.cleanup(store, cleanup).await;
            return Ok(Outcome::Completed {
                pending_cleanup: None,
            });
        }
        Ok(outcome)
    }

    /// Record `operation_id` on the slot of `key_id`, leaving the cleanup of
    /// the other side to the caller.
    ///
    /// Retries until the conditional write succeeds or the worker is told to
    /// stop. Store errors are returned as they are; a value that does not
    /// decode aborts with [`LogicError::Corruption`].
    #[instrument(skip(self, store), fields(worker = self.worker_id))]
    pub async fn attempt(
        &self,
        store: &dyn ConditionalStore,
        key_id: i64,
        operation_id: OperationId,
        operation: Operation,
    ) -> Result<Outcome, LogicError> {
        let side = WriteSide::for_operation(operation)?;
        let recorded = RecordedStore::new(store, self.recorder.as_ref());
        let primary_key = self.keys.generate_key(key_id);
        let backup_key = self.keys.generate_key(backup_key_id(key_id));

        loop {
            let read = recorded.get_slot(&primary_key).await?;
            let primary_value = self.decoded(&primary_key, read.value)?;
            let primary = SideSnapshot {
                raw: read.raw,
                key: primary_key.clone(),
            };
            let read = recorded.get_slot(&backup_key).await?;
            let backup_value = self.decoded(&backup_key, read.value)?;
            let backup = SideSnapshot {
                raw: read.raw,
                key: backup_key.clone(),
            };

            let Some(next) = self
                .next_value(primary_value.as_ref(), backup_value.as_ref(), operation_id)
                .await
            else {
                self.stats.record_overflow_retry();
                debug!(key_id, operation_id, "value cannot be compacted yet, retrying");
                if self.should_abandon() {
                    return Ok(Outcome::Abandoned);
                }
                self.backoff().await;
                continue;
            };
            let encoded = codec::encode(&next)?;

            let (target, other) = match side {
                WriteSide::Primary => (primary, backup),
                WriteSide::Backup => (backup, primary),
            };
            let written = match &target.raw {
                None => recorded.put_if_absent(&target.key, &encoded).await?,
                Some(expected) => recorded.replace(&target.key, expected, &encoded).await?,
            };
            if !written {
                self.stats.record_precondition_retry();
                trace!(key = %target.key, operation_id, "lost the race, re-reading slot");
                if self.should_abandon() {
                    return Ok(Outcome::Abandoned);
                }
                continue;
            }

            self.stats.record_slot_written();
            let pending_cleanup = other.raw.map(|expected| PendingCleanup {
                key: other.key,
                expected,
            });
            return Ok(Outcome::Completed { pending_cleanup });
        }
    }

    /// Count an operation whose write is known to be durable.
    pub(crate) fn record_durable(&self) {
        self.stats.record_completed();
    }

    /// Best-effort conditional remove of a stale side.
    ///
    /// Never retried: a failed remove leaves a duplicate that later writes
    /// merge away. Store errors are recorded and logged, not returned.
    pub async fn cleanup(&self, store: &dyn ConditionalStore, cleanup: &PendingCleanup) -> bool {
        let recorded = RecordedStore::new(store, self.recorder.as_ref());
        let removed = match recorded.remove(&cleanup.key, &cleanup.expected).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key = %cleanup.key, error = %e, "cleanup remove failed");
                false
            }
        };
        self.stats.record_cleanup(removed);
        removed
    }

    async fn next_value(
        &self,
        primary: Option<&LogEntryMap>,
        backup: Option<&LogEntryMap>,
        operation_id: OperationId,
    ) -> Option<LogEntryMap> {
        if primary.is_none() && backup.is_none() {
            return Some(LogEntryMap::singleton(self.worker_id, operation_id));
        }

        let merged = LogEntryMap::join_opt(primary, backup);
        if merged.len() < self.settings.value_max_size {
            return Some(merged.with_entry(self.worker_id, operation_id));
        }

        let query = checked_operations(
            self.oracle.as_ref(),
            self.settings.worker_population,
            self.worker_id,
            &merged,
        )
        .await;
        self.stats.record_quorum_query(query.is_partial());
        merged.with_entry_checked(
            self.worker_id,
            operation_id,
            &query.floors,
            self.settings.value_max_size,
        )
    }

    fn decoded(
        &self,
        key: &str,
        value: Result<Option<LogEntryMap>, CodecError>,
    ) -> Result<Option<LogEntryMap>, LogicError> {
        value.map_err(|source| {
            error!(key = %key, worker = self.worker_id, "stored value is not a log entry map");
            LogicError::Corruption {
                key: key.to_string(),
                source,
            }
        })
    }

    fn should_abandon(&self) -> bool {
        if self.control.should_stop() {
            self.stats.record_abandoned();
            debug!(worker = self.worker_id, "stop requested, abandoning operation");
            return true;
        }
        false
    }

    async fn backoff(&self) {
        if self.settings.retry_backoff.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.settings.retry_backoff).await;
        }
    }
}
