//! Auditor confirming that published operations are recorded in the store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use sharedlog_core::{backup_key_id, decode, KeyGenerator, LogEntryMap, OperationId, WorkerId};
use sharedlog_logic::CompletedOperation;
use sharedlog_store::MemoryStore;
use tracing::{debug, trace};

use crate::invariants::Violation;
use crate::registry::CheckerRegistry;

/// Confirms each worker's operations in id order and publishes its progress
/// to the [`CheckerRegistry`].
///
/// Reads the raw store, bypassing any fault or delay layers. The two keys of
/// a slot are not read atomically, so a miss while workers are running is
/// retried on the next pass; only the final audit reports it.
pub struct LogChecker {
    id: usize,
    store: Arc<MemoryStore>,
    keys: Arc<dyn KeyGenerator>,
    registry: Arc<CheckerRegistry>,
    pending: BTreeMap<WorkerId, VecDeque<CompletedOperation>>,
    last_published: HashMap<WorkerId, OperationId>,
    violations: Vec<Violation>,
    confirmed: u64,
}

impl LogChecker {
    pub fn new(
        id: usize,
        store: Arc<MemoryStore>,
        keys: Arc<dyn KeyGenerator>,
        registry: Arc<CheckerRegistry>,
    ) -> Self {
        LogChecker {
            id,
            store,
            keys,
            registry,
            pending: BTreeMap::new(),
            last_published: HashMap::new(),
            violations: Vec::new(),
            confirmed: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confirmed(&self) -> u64 {
        self.confirmed
    }

    pub fn pending(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    /// Queue a published operation. Ids of one worker must arrive consecutively.
    pub fn enqueue(&mut self, op: CompletedOperation) {
        let previous = self.last_published.insert(op.worker_id, op.operation_id);
        let expected = previous.unwrap_or(0) + 1;
        if op.operation_id != expected {
            self.violations
                .push(Violation::out_of_sequence(&op, previous.unwrap_or(0)));
        }
        self.pending.entry(op.worker_id).or_default().push_back(op);
    }

    /// Confirm queued operations that are visible in their slots. Stops at
    /// the first miss per worker so confirmations stay in order.
    pub fn check_pending(&mut self) -> usize {
        let mut newly_confirmed = 0;
        let workers: Vec<WorkerId> = self.pending.keys().copied().collect();

        for worker in workers {
            while let Some(op) = self.front(worker) {
                if !self.slot_value(op.key_id).covers(op.worker_id, op.operation_id) {
                    trace!(
                        checker = self.id,
                        worker,
                        operation = op.operation_id,
                        "not visible yet"
                    );
                    break;
                }
                self.confirm(&op);
                newly_confirmed += 1;
            }
        }

        if newly_confirmed > 0 {
            debug!(checker = self.id, newly_confirmed, "checker pass");
        }
        newly_confirmed
    }

    /// Check everything still queued once workers are quiescent.
    pub fn final_audit(&mut self) -> Vec<Violation> {
        self.check_pending();

        let remaining: Vec<CompletedOperation> = std::mem::take(&mut self.pending)
            .into_values()
            .flatten()
            .collect();
        for op in remaining {
            let slot = self.slot_value(op.key_id);
            if slot.covers(op.worker_id, op.operation_id) {
                self.confirm(&op);
            } else {
                self.violations.push(Violation::lost_operation(&op, &slot));
            }
        }

        debug!(
            checker = self.id,
            confirmed = self.confirmed,
            violations = self.violations.len(),
            "final audit finished"
        );
        std::mem::take(&mut self.violations)
    }

    fn front(&self, worker: WorkerId) -> Option<CompletedOperation> {
        self.pending.get(&worker).and_then(|queue| queue.front().copied())
    }

    fn confirm(&mut self, op: &CompletedOperation) {
        if let Some(queue) = self.pending.get_mut(&op.worker_id) {
            if queue.front() == Some(op) {
                queue.pop_front();
            }
        }
        self.registry.confirm(self.id, op.worker_id, op.operation_id);
        self.confirmed += 1;
    }

    /// Join of both keys of the slot; unreadable sides count as empty.
    fn slot_value(&self, key_id: i64) -> LogEntryMap {
        let read = |id: i64| {
            self.store
                .peek(&self.keys.generate_key(id))
                .and_then(|raw| decode(&raw).ok())
        };
        let primary = read(key_id);
        let backup = read(backup_key_id(key_id));
        LogEntryMap::join_opt(primary.as_ref(), backup.as_ref())
    }
}
