use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sharedlog_core::{
    backup_key_id, decode, encode, ConditionalStore, KeyGenerator, LogEntryMap, Operation,
    OperationId, OperationStats, PrefixKeyGenerator, QuorumOracle, StoreError, Transaction,
    Transactional, WorkerId,
};
use sharedlog_logic::{
    LogicError, LogicSettings, Outcome, PendingCleanup, SharedLogLogic, WorkerControl,
};
use sharedlog_store::{MemoryStore, MemoryTransactions};

/// Oracle answering from a list of floor maps, moving to the next map once
/// every other worker has been asked.
struct ScriptedOracle {
    rounds: Vec<HashMap<WorkerId, OperationId>>,
    per_round: usize,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    fn new(population: u32, rounds: Vec<HashMap<WorkerId, OperationId>>) -> Self {
        ScriptedOracle {
            rounds,
            per_round: population as usize - 1,
            calls: AtomicUsize::new(0),
        }
    }

    fn fixed(population: u32, floors: HashMap<WorkerId, OperationId>) -> Self {
        Self::new(population, vec![floors])
    }

    fn rounds_started(&self) -> usize {
        self.calls.load(Ordering::SeqCst).div_ceil(self.per_round)
    }
}

#[async_trait]
impl QuorumOracle for ScriptedOracle {
    async fn checked_operation_floor(
        &self,
        worker: WorkerId,
        _since: Option<OperationId>,
    ) -> Result<OperationId, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let round = (call / self.per_round).min(self.rounds.len() - 1);
        Ok(self.rounds[round].get(&worker).copied().unwrap_or(0))
    }
}

/// Store whose selected calls fail with a timeout.
struct FailingStore {
    inner: MemoryStore,
    fail_replace: bool,
    fail_remove: bool,
}

#[async_trait]
impl ConditionalStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key).await
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        self.inner.put_if_absent(key, value).await
    }

    async fn replace(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        if self.fail_replace {
            return Err(StoreError::Timeout {
                operation: "replace".to_string(),
                key: key.to_string(),
            });
        }
        self.inner.replace(key, expected, value).await
    }

    async fn remove(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        if self.fail_remove {
            return Err(StoreError::Timeout {
                operation: "remove".to_string(),
                key: key.to_string(),
            });
        }
        self.inner.remove(key, expected).await
    }
}

struct Harness {
    logic: SharedLogLogic,
    stats: Arc<OperationStats>,
    keys: PrefixKeyGenerator,
}

fn harness(
    worker: WorkerId,
    population: u32,
    value_max_size: usize,
    oracle: Arc<dyn QuorumOracle>,
) -> Harness {
    let stats = Arc::new(OperationStats::new());
    let settings = LogicSettings {
        value_max_size,
        worker_population: population,
        retry_backoff: Duration::from_millis(1),
    };
    let logic = SharedLogLogic::new(
        worker,
        settings,
        Arc::new(PrefixKeyGenerator::default()),
        oracle,
        stats.clone(),
        WorkerControl::new(),
    );
    Harness {
        logic,
        stats,
        keys: PrefixKeyGenerator::default(),
    }
}

fn no_floors(population: u32) -> Arc<dyn QuorumOracle> {
    Arc::new(ScriptedOracle::fixed(population, HashMap::new()))
}

fn map(pairs: &[(WorkerId, OperationId)]) -> LogEntryMap {
    pairs.iter().copied().collect()
}

fn read(store: &MemoryStore, key: &str) -> Option<LogEntryMap> {
    store.peek(key).map(|raw| decode(&raw).unwrap())
}

fn slot_keys(h: &Harness, key_id: i64) -> (String, String) {
    (
        h.keys.generate_key(key_id),
        h.keys.generate_key(backup_key_id(key_id)),
    )
}

#[tokio::test]
async fn test_single_worker_put_put_remove() {
    let store = MemoryStore::new();
    let h = harness(3, 4, 50, no_floors(4));
    let (primary, backup) = slot_keys(&h, 5);

    let outcome = h.logic.invoke(&store, 5, 1, Operation::Put).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(read(&store, &primary), Some(map(&[(3, 1)])));
    assert_eq!(read(&store, &backup), None);

    h.logic.invoke(&store, 5, 2, Operation::Put).await.unwrap();
    assert_eq!(read(&store, &primary), Some(map(&[(3, 2)])));
    assert_eq!(read(&store, &backup), None);

    h.logic.invoke(&store, 5, 3, Operation::Remove).await.unwrap();
    assert_eq!(read(&store, &backup), Some(map(&[(3, 3)])));
    assert_eq!(read(&store, &primary), None);

    let snap = h.logic.stats().snapshot();
    assert_eq!(snap.completed, 3);
    assert_eq!(snap.slots_written, 3);
    assert_eq!(snap.cleanups, 1);
    assert_eq!(snap.precondition_retries, 0);
}

#[tokio::test]
async fn test_remove_mirrors_put() {
    let store = MemoryStore::new();
    let h = harness(2, 3, 50, no_floors(3));
    let (primary, backup) = slot_keys(&h, 9);
    store.put(&primary, &encode(&map(&[(1, 4)])).unwrap());

    h.logic.invoke(&store, 9, 1, Operation::Remove).await.unwrap();

    let backup_value = read(&store, &backup).unwrap();
    assert!(backup_value.covers(1, 4));
    assert!(backup_value.covers(2, 1));
    assert_eq!(read(&store, &primary), None);
}

#[tokio::test]
async fn test_put_merges_both_sides() {
    let store = MemoryStore::new();
    let h = harness(0, 3, 50, no_floors(3));
    let (primary, backup) = slot_keys(&h, 2);
    store.put(&primary, &encode(&map(&[(1, 4)])).unwrap());
    store.put(&backup, &encode(&map(&[(1, 3), (2, 6)])).unwrap());

    h.logic.invoke(&store, 2, 7, Operation::Put).await.unwrap();

    assert_eq!(read(&store, &primary), Some(map(&[(0, 7), (1, 4), (2, 6)])));
    assert_eq!(read(&store, &backup), None);
}

#[tokio::test]
async fn test_attempt_returns_pending_cleanup() {
    let store = MemoryStore::new();
    let h = harness(0, 2, 50, no_floors(2));
    let (primary, backup) = slot_keys(&h, 1);
    let stale = encode(&map(&[(1, 2)])).unwrap();
    store.put(&backup, &stale);

    let outcome = h.logic.attempt(&store, 1, 1, Operation::Put).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Completed {
            pending_cleanup: Some(PendingCleanup {
                key: backup.clone(),
                expected: stale,
            })
        }
    );
    assert!(store.peek(&backup).is_some());
    assert_eq!(read(&store, &primary), Some(map(&[(0, 1), (1, 2)])));
}

#[tokio::test]
async fn test_compaction_drops_fully_checked_entries() {
    let store = MemoryStore::new();
    let oracle = Arc::new(ScriptedOracle::fixed(4, HashMap::from([(1, 5), (2, 7)])));
    let h = harness(3, 4, 2, oracle.clone());
    let (primary, _) = slot_keys(&h, 0);
    store.put(&primary, &encode(&map(&[(1, 5), (2, 7)])).unwrap());

    h.logic.invoke(&store, 0, 8, Operation::Put).await.unwrap();

    assert_eq!(read(&store, &primary), Some(map(&[(3, 8)])));
    assert_eq!(oracle.rounds_started(), 1);
}

#[tokio::test]
async fn test_compaction_keeps_unchecked_entry() {
    let store = MemoryStore::new();
    let oracle = Arc::new(ScriptedOracle::fixed(4, HashMap::from([(1, 4), (2, 7)])));
    let h = harness(3, 4, 2, oracle);
    let (primary, _) = slot_keys(&h, 0);
    store.put(&primary, &encode(&map(&[(1, 5), (2, 7)])).unwrap());

    h.logic.invoke(&store, 0, 8, Operation::Put).await.unwrap();

    assert_eq!(read(&store, &primary), Some(map(&[(1, 5), (3, 8)])));
}

#[tokio::test(start_paused = true)]
async fn test_overflow_requeries_floors_on_retry() {
    let store = MemoryStore::new();
    let oracle = Arc::new(ScriptedOracle::new(
        4,
        vec![
            HashMap::from([(1, 4), (2, 6)]),
            HashMap::from([(1, 5), (2, 7)]),
        ],
    ));
    let h = harness(3, 4, 2, oracle.clone());
    let (primary, _) = slot_keys(&h, 0);
    store.put(&primary, &encode(&map(&[(1, 5), (2, 7)])).unwrap());

    h.logic.invoke(&store, 0, 8, Operation::Put).await.unwrap();

    assert_eq!(read(&store, &primary), Some(map(&[(3, 8)])));
    assert!(oracle.rounds_started() >= 2);
    let snap = h.logic.stats().snapshot();
    assert_eq!(snap.overflow_retries, 1);
    assert_eq!(snap.quorum_queries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_overflow_abandons_when_stopped() {
    let store = MemoryStore::new();
    let h = harness(3, 4, 1, no_floors(4));
    let (primary, _) = slot_keys(&h, 0);
    let before = encode(&map(&[(1, 5)])).unwrap();
    store.put(&primary, &before);

    h.logic.control().terminate();
    let outcome = h.logic.invoke(&store, 0, 1, Operation::Put).await.unwrap();

    assert_eq!(outcome, Outcome::Abandoned);
    assert_eq!(store.peek(&primary), Some(before));
    assert_eq!(h.logic.stats().snapshot().abandoned, 1);
}

#[tokio::test]
async fn test_get_is_rejected() {
    let store = MemoryStore::new();
    let h = harness(0, 1, 50, no_floors(1));

    let err = h.logic.invoke(&store, 0, 1, Operation::Get).await.unwrap_err();
    assert!(matches!(err, LogicError::UnsupportedOperation(Operation::Get)));
    assert!(err.is_fatal());
    assert_eq!(h.stats.snapshot().total_requests(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_corrupted_value_is_fatal() {
    let store = MemoryStore::new();
    let h = harness(0, 1, 50, no_floors(1));
    let (_, backup) = slot_keys(&h, 4);
    store.put(&backup, b"definitely not a log");

    let err = h.logic.invoke(&store, 4, 1, Operation::Put).await.unwrap_err();
    match &err {
        LogicError::Corruption { key, .. } => assert_eq!(key, &backup),
        other => panic!("expected corruption, got {other:?}"),
    }
    assert!(err.is_fatal());

    let snap = h.stats.snapshot();
    let get = snap.get(Operation::Get).unwrap();
    assert_eq!(get.requests, 2);
    assert_eq!(get.misses, 1);
    assert_eq!(get.hits, 0);
    assert_eq!(get.errors, 1);
}

#[tokio::test]
async fn test_corrupted_primary_stops_before_backup_read() {
    let store = MemoryStore::new();
    let h = harness(0, 1, 50, no_floors(1));
    let (primary, _) = slot_keys(&h, 9);
    store.put(&primary, b"not a log");

    let err = h.logic.invoke(&store, 9, 1, Operation::Remove).await.unwrap_err();
    assert!(matches!(err, LogicError::Corruption { ref key, .. } if key == &primary));

    let snap = h.stats.snapshot();
    let get = snap.get(Operation::Get).unwrap();
    assert_eq!(get.requests, 1);
    assert_eq!(get.errors, 1);
    assert_eq!(snap.total_requests(), 1);
}

#[tokio::test]
async fn test_store_error_is_recorded_and_returned() {
    let store = FailingStore {
        inner: MemoryStore::new(),
        fail_replace: true,
        fail_remove: false,
    };
    let h = harness(0, 1, 50, no_floors(1));

    h.logic.invoke(&store, 0, 1, Operation::Put).await.unwrap();
    let err = h.logic.invoke(&store, 0, 2, Operation::Put).await.unwrap_err();

    assert!(matches!(err, LogicError::Store(StoreError::Timeout { .. })));
    assert!(!err.is_fatal());
    let snap = h.stats.snapshot();
    assert_eq!(snap.get(Operation::Replace).unwrap().errors, 1);
    assert_eq!(snap.get(Operation::PutIfAbsent).unwrap().hits, 1);
}

#[tokio::test]
async fn test_cleanup_failure_is_swallowed() {
    let store = FailingStore {
        inner: MemoryStore::new(),
        fail_replace: false,
        fail_remove: true,
    };
    let h = harness(0, 1, 50, no_floors(1));
    let (primary, backup) = slot_keys(&h, 0);

    h.logic.invoke(&store, 0, 1, Operation::Put).await.unwrap();
    let outcome = h.logic.invoke(&store, 0, 2, Operation::Remove).await.unwrap();

    assert!(outcome.is_completed());
    assert!(store.inner.peek(&primary).is_some());
    assert_eq!(read(&store.inner, &backup), Some(map(&[(0, 2)])));
    assert_eq!(h.logic.stats().snapshot().cleanup_failures, 1);
    let snap = h.stats.snapshot();
    assert_eq!(snap.get(Operation::ConditionalRemove).unwrap().errors, 1);
}

#[tokio::test]
async fn test_transactional_view_defers_writes() {
    let store = Arc::new(MemoryStore::new());
    let transactions = MemoryTransactions::new(store.clone());
    let h = harness(1, 2, 50, no_floors(2));
    let (primary, _) = slot_keys(&h, 3);

    let mut tx = transactions.new_transaction();
    tx.begin().await.unwrap();
    let view = tx.wrap(store.clone());

    h.logic.attempt(view.as_ref(), 3, 1, Operation::Put).await.unwrap();
    h.logic.attempt(view.as_ref(), 3, 2, Operation::Put).await.unwrap();
    assert!(store.peek(&primary).is_none());

    tx.commit().await.unwrap();
    assert_eq!(read(&store, &primary), Some(map(&[(1, 2)])));
}

#[tokio::test]
async fn test_rolled_back_write_is_not_completed() {
    let store = Arc::new(MemoryStore::new());
    let transactions = MemoryTransactions::new(store.clone());
    let h = harness(1, 2, 50, no_floors(2));

    let mut tx = transactions.new_transaction();
    tx.begin().await.unwrap();
    let view = tx.wrap(store.clone());
    let outcome = h.logic.attempt(view.as_ref(), 3, 1, Operation::Put).await.unwrap();
    assert!(outcome.is_completed());
    tx.rollback().await.unwrap();

    assert!(store.is_empty());
    let snap = h.logic.stats().snapshot();
    assert_eq!(snap.slots_written, 1);
    assert_eq!(snap.completed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_lose_no_operation() {
    const WORKERS: u32 = 6;
    const OPS: u64 = 40;

    let store = Arc::new(MemoryStore::new());
    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let h = harness(worker, WORKERS, 50, no_floors(WORKERS));
            for op in 1..=OPS {
                let operation = if (op + worker as u64) % 2 == 0 {
                    Operation::Put
                } else {
                    Operation::Remove
                };
                let outcome = h.logic.invoke(store.as_ref(), 0, op, operation).await.unwrap();
                assert!(outcome.is_completed());
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let keys = PrefixKeyGenerator::default();
    let joined = LogEntryMap::join_opt(
        read(&store, &keys.generate_key(0)).as_ref(),
        read(&store, &keys.generate_key(backup_key_id(0))).as_ref(),
    );
    for worker in 0..WORKERS {
        assert!(joined.covers(worker, OPS), "worker {worker} lost its last op");
    }
}

#[tokio::test]
async fn test_pending_cleanup_runs_on_raw_store() {
    let store = Arc::new(MemoryStore::new());
    let h = harness(0, 1, 50, no_floors(1));
    let (primary, backup) = slot_keys(&h, 0);

    h.logic.invoke(store.as_ref(), 0, 1, Operation::Put).await.unwrap();
    let outcome = h
        .logic
        .attempt(store.as_ref(), 0, 2, Operation::Remove)
        .await
        .unwrap();
    let Outcome::Completed {
        pending_cleanup: Some(cleanup),
    } = outcome
    else {
        panic!("expected a pending cleanup");
    };
    assert_eq!(cleanup.key, primary);

    assert!(h.logic.cleanup(store.as_ref(), &cleanup).await);
    assert!(store.peek(&primary).is_none());
    assert!(store.peek(&backup).is_some());
}
