use sharedlog_core::{decode, LogEntryMap, WorkerId};
use sharedlog_logic::CompletedOperation;
use sharedlog_store::MemoryStore;

/// A violation detected during simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub worker_id: Option<WorkerId>,
    pub invariant: String,
    pub details: String,
}

impl Violation {
    pub fn lost_operation(op: &CompletedOperation, slot: &LogEntryMap) -> Self {
        Violation {
            worker_id: Some(op.worker_id),
            invariant: "lost-operation".to_string(),
            details: format!(
                "{} #{} on key {} is not recorded; slot holds {:?}",
                op.operation,
                op.operation_id,
                op.key_id,
                slot.iter().collect::<Vec<_>>()
            ),
        }
    }

    pub fn out_of_sequence(op: &CompletedOperation, previous: u64) -> Self {
        Violation {
            worker_id: Some(op.worker_id),
            invariant: "operation-sequence".to_string(),
            details: format!(
                "operation #{} published after #{}",
                op.operation_id, previous
            ),
        }
    }

    pub fn worker_failed(worker: WorkerId, error: impl std::fmt::Display) -> Self {
        Violation {
            worker_id: Some(worker),
            invariant: "worker-failed".to_string(),
            details: error.to_string(),
        }
    }
}

/// Check every value in the store: it must decode as a log entry map and
/// hold at most `value_max_size` entries.
pub fn check_stored_values(store: &MemoryStore, value_max_size: usize) -> Vec<Violation> {
    let mut violations = Vec::new();

    for key in store.keys() {
        let Some(raw) = store.peek(&key) else {
            continue;
        };
        match decode(&raw) {
            Ok(value) if value.len() > value_max_size => violations.push(Violation {
                worker_id: None,
                invariant: "value-size-bound".to_string(),
                details: format!(
                    "'{}' holds {} entries, bound is {}",
                    key,
                    value.len(),
                    value_max_size
                ),
            }),
            Ok(_) => {}
            Err(e) => violations.push(Violation {
                worker_id: None,
                invariant: "value-decodes".to_string(),
                details: format!("'{}' does not hold a log entry map: {}", key, e),
            }),
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharedlog_core::{encode, Operation};

    #[test]
    fn test_clean_store_has_no_violations() {
        let store = MemoryStore::new();
        store.put("key_1", &encode(&LogEntryMap::singleton(0, 1)).unwrap());
        assert!(check_stored_values(&store, 1).is_empty());
    }

    #[test]
    fn test_oversized_value() {
        let store = MemoryStore::new();
        let value: LogEntryMap = [(0, 1), (1, 1), (2, 1)].into_iter().collect();
        store.put("key_1", &encode(&value).unwrap());

        let violations = check_stored_values(&store, 2);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "value-size-bound");
    }

    #[test]
    fn test_undecodable_value() {
        let store = MemoryStore::new();
        store.put("key_1", b"garbage");

        let violations = check_stored_values(&store, 2);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "value-decodes");
        assert!(violations[0].details.contains("key_1"));
    }

    #[test]
    fn test_lost_operation_details() {
        let op = CompletedOperation {
            worker_id: 2,
            operation_id: 9,
            key_id: 4,
            operation: Operation::Remove,
        };
        let v = Violation::lost_operation(&op, &LogEntryMap::singleton(2, 8));
        assert_eq!(v.worker_id, Some(2));
        assert!(v.details.contains("#9"));
        assert!(v.details.contains("key 4"));
    }
}
