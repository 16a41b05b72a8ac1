//! Worker loop driving the shared-log logic.
//!
//! A stressor picks a key and an operation kind, hands them to
//! [`SharedLogLogic`] and publishes every operation that became durable. In
//! transactional mode operations are grouped into batches; a batch that fails
//! to commit is replayed with the same operation ids and keys.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use sharedlog_config::StressConfig;
use sharedlog_core::{
    ConditionalStore, Operation, OperationId, Transaction, Transactional, WorkerId,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::LogicError;
use crate::logic::{Outcome, PendingCleanup, SharedLogLogic};
use crate::stats::LogicStatsSnapshot;

/// An operation that is durable in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletedOperation {
    pub worker_id: WorkerId,
    pub operation_id: OperationId,
    pub key_id: i64,
    pub operation: Operation,
}

/// Contiguous range of key ids a worker operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub start: i64,
    pub len: u64,
}

impl KeyRange {
    /// Shared mode gives every worker the same range; otherwise ranges are
    /// disjoint and ordered by worker id.
    pub fn for_worker(config: &StressConfig, worker: WorkerId) -> Self {
        let general = &config.general;
        let start = if general.shared_keys {
            general.key_id_offset
        } else {
            general.key_id_offset + worker as i64 * general.num_entries as i64
        };
        KeyRange {
            start,
            len: general.num_entries,
        }
    }

    pub fn contains(&self, key_id: i64) -> bool {
        key_id >= self.start && ((key_id - self.start) as u64) < self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let start = self.start;
        (0..self.len).map(move |offset| start + offset as i64)
    }

    fn pick(&self, rng: &mut ChaCha8Rng) -> i64 {
        self.start + rng.gen_range(0..self.len.max(1)) as i64
    }
}

#[derive(Debug, Clone, Copy)]
struct OperationMix {
    put: u32,
    remove: u32,
    get: u32,
}

impl OperationMix {
    fn choose(&self, rng: &mut ChaCha8Rng) -> Operation {
        let total = self.put + self.remove + self.get;
        if total == 0 {
            return Operation::Put;
        }
        let roll = rng.gen_range(0..total);
        if roll < self.put {
            Operation::Put
        } else if roll < self.put + self.remove {
            Operation::Remove
        } else {
            Operation::Get
        }
    }
}

/// Summary returned when a stressor stops.
#[derive(Debug, Clone, Serialize)]
pub struct StressorReport {
    pub worker_id: WorkerId,
    /// Operations published as durable.
    pub completed: u64,
    /// Id the next operation would have used.
    pub next_operation_id: OperationId,
    pub logic: LogicStatsSnapshot,
}

struct Batch {
    tx: Box<dyn Transaction>,
    view: Arc<dyn ConditionalStore>,
    first_operation_id: OperationId,
    done: Vec<CompletedOperation>,
    cleanups: Vec<PendingCleanup>,
}

#[derive(Default)]
struct RunState {
    batch: Option<Batch>,
    replay: VecDeque<(i64, Operation)>,
    completed: u64,
}

pub struct Stressor {
    logic: SharedLogLogic,
    store: Arc<dyn ConditionalStore>,
    transactions: Option<Arc<dyn Transactional>>,
    transaction_size: usize,
    keys: KeyRange,
    mix: OperationMix,
    rng: ChaCha8Rng,
    next_operation_id: OperationId,
    operation_limit: Option<u64>,
    completions: Option<mpsc::Sender<CompletedOperation>>,
}

impl Stressor {
    pub fn new(
        logic: SharedLogLogic,
        store: Arc<dyn ConditionalStore>,
        config: &StressConfig,
        seed: u64,
    ) -> Self {
        let general = &config.general;
        Stressor {
            keys: KeyRange::for_worker(config, logic.worker_id()),
            logic,
            store,
            transactions: None,
            transaction_size: general.transaction_size as usize,
            mix: OperationMix {
                put: general.put_ratio,
                remove: general.remove_ratio,
                get: general.get_ratio,
            },
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_operation_id: 1,
            operation_limit: None,
            completions: None,
        }
    }

    /// Source of transactions, required when `transaction_size > 0`.
    pub fn with_transactions(mut self, transactions: Arc<dyn Transactional>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    /// Channel receiving every operation once it is durable.
    pub fn with_completions(mut self, sender: mpsc::Sender<CompletedOperation>) -> Self {
        self.completions = Some(sender);
        self
    }

    /// Stop after this many durable operations.
    pub fn with_operation_limit(mut self, limit: u64) -> Self {
        self.operation_limit = Some(limit);
        self
    }

    pub fn key_range(&self) -> KeyRange {
        self.keys
    }

    pub fn spawn(self) -> JoinHandle<Result<StressorReport, LogicError>> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> Result<StressorReport, LogicError> {
        if self.transaction_size > 0 && self.transactions.is_none() {
            return Err(LogicError::TransactionsUnavailable(self.transaction_size));
        }
        let worker = self.logic.worker_id();
        info!(
            worker,
            transaction_size = self.transaction_size,
            "stressor started"
        );

        let mut state = RunState::default();
        let result = self.drive(&mut state).await;
        if let Some(batch) = state.batch.take() {
            self.discard(batch).await;
        }

        match result {
            Ok(()) => {
                info!(worker, completed = state.completed, "stressor stopped");
                Ok(StressorReport {
                    worker_id: worker,
                    completed: state.completed,
                    next_operation_id: self.next_operation_id,
                    logic: self.logic.stats().snapshot(),
                })
            }
            Err(e) => {
                error!(worker, error = %e, "stressor failed");
                Err(e)
            }
        }
    }

    async fn drive(&mut self, state: &mut RunState) -> Result<(), LogicError> {
        let worker = self.logic.worker_id();
        loop {
            if self.logic.control().should_stop() {
                return Ok(());
            }
            if state.batch.is_none()
                && state.replay.is_empty()
                && self.limit_reached(state.completed)
            {
                return Ok(());
            }
            if self.transaction_size > 0 && state.batch.is_none() {
                state.batch = Some(self.begin_batch().await?);
            }

            let (key_id, operation) = match state.replay.pop_front() {
                Some(pending) => pending,
                None => self.choose_operation(),
            };
            let operation_id = self.next_operation_id;
            let view = match &state.batch {
                Some(batch) => batch.view.clone(),
                None => self.store.clone(),
            };

            match self
                .logic
                .attempt(view.as_ref(), key_id, operation_id, operation)
                .await
            {
                Ok(Outcome::Completed { pending_cleanup }) => {
                    self.next_operation_id += 1;
                    let done = CompletedOperation {
                        worker_id: worker,
                        operation_id,
                        key_id,
                        operation,
                    };
                    let commit_due = match state.batch.as_mut() {
                        Some(batch) => {
                            batch.done.push(done);
                            batch.cleanups.extend(pending_cleanup);
                            let pending = batch.done.len() as u64;
                            batch.done.len() >= self.transaction_size
                                || self.limit_reached(state.completed + pending)
                        }
                        None => {
                            if let Some(cleanup) = pending_cleanup {
                                self.logic.cleanup(self.store.as_ref(), &cleanup).await;
                            }
                            self.publish(done).await;
                            state.completed += 1;
                            false
                        }
                    };
                    if commit_due {
                        self.commit(state).await?;
                    }
                }
                Ok(Outcome::Abandoned) => return Ok(()),
                Err(LogicError::Store(e)) if e.is_transient() => {
                    warn!(
                        worker,
                        key_id,
                        operation_id,
                        error = %e,
                        "transient store error, retrying"
                    );
                    state.replay.push_front((key_id, operation));
                    if let Some(batch) = state.batch.take() {
                        self.rollback(batch, &mut state.replay).await;
                    }
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn choose_operation(&mut self) -> (i64, Operation) {
        let key_id = self.keys.pick(&mut self.rng);
        let operation = self.mix.choose(&mut self.rng);
        (key_id, operation)
    }

    fn limit_reached(&self, completed: u64) -> bool {
        self.operation_limit.map_or(false, |limit| completed >= limit)
    }

    async fn begin_batch(&self) -> Result<Batch, LogicError> {
        let transactions = self
            .transactions
            .as_ref()
            .ok_or(LogicError::TransactionsUnavailable(self.transaction_size))?;
        let mut tx = transactions.new_transaction();
        tx.begin().await?;
        let view = tx.wrap(self.store.clone());
        Ok(Batch {
            tx,
            view,
            first_operation_id: self.next_operation_id,
            done: Vec::with_capacity(self.transaction_size),
            cleanups: Vec::new(),
        })
    }

    async fn commit(&mut self, state: &mut RunState) -> Result<(), LogicError> {
        let Some(mut batch) = state.batch.take() else {
            return Ok(());
        };
        match batch.tx.commit().await {
            Ok(()) => {
                for cleanup in &batch.cleanups {
                    self.logic.cleanup(self.store.as_ref(), cleanup).await;
                }
                let count = batch.done.len() as u64;
                for done in batch.done {
                    self.publish(done).await;
                }
                state.completed += count;
                debug!(
                    worker = self.logic.worker_id(),
                    operations = count,
                    "transaction committed"
                );
                Ok(())
            }
            Err(e) if e.is_transient() => {
                warn!(
                    worker = self.logic.worker_id(),
                    error = %e,
                    "commit failed, replaying batch"
                );
                self.requeue(batch.first_operation_id, batch.done, &mut state.replay);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn rollback(&mut self, mut batch: Batch, replay: &mut VecDeque<(i64, Operation)>) {
        if let Err(e) = batch.tx.rollback().await {
            warn!(worker = self.logic.worker_id(), error = %e, "rollback failed");
        }
        self.requeue(batch.first_operation_id, batch.done, replay);
    }

    /// Drop an uncommitted batch on the way out.
    async fn discard(&mut self, mut batch: Batch) {
        if let Err(e) = batch.tx.rollback().await {
            warn!(worker = self.logic.worker_id(), error = %e, "rollback failed");
        }
        self.next_operation_id = batch.first_operation_id;
    }

    /// Put a failed batch back in front of `replay`, reusing its operation ids.
    fn requeue(
        &mut self,
        first_operation_id: OperationId,
        done: Vec<CompletedOperation>,
        replay: &mut VecDeque<(i64, Operation)>,
    ) {
        for op in done.into_iter().rev() {
            replay.push_front((op.key_id, op.operation));
        }
        self.next_operation_id = first_operation_id;
    }

    async fn publish(&self, done: CompletedOperation) {
        self.logic.record_durable();
        if let Some(sender) = &self.completions {
            if sender.send(done).await.is_err() {
                debug!(worker = done.worker_id, "completion receiver dropped");
            }
        }
    }
}
