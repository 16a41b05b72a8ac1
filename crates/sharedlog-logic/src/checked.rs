//! Quorum query feeding log compaction.
//!
//! Compaction may drop an entry only once every checker has confirmed it, so
//! the query asks the oracle for each worker's confirmed floor. A worker whose
//! floor cannot be fetched is left out; compaction then keeps all of its
//! entries and the caller may retry later.

use sharedlog_core::{CheckedOperations, LogEntryMap, QuorumOracle, WorkerId};
use tracing::{debug, warn};

/// Floors collected from one quorum query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckedQuery {
    pub floors: CheckedOperations,
    /// Workers whose floor could not be fetched.
    pub failed: Vec<WorkerId>,
}

impl CheckedQuery {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Collect the checked floor of every worker in `0..population`.
///
/// The caller's own floor is taken from its entry in `value` rather than the
/// oracle: everything up to its last recorded id is superseded by the entry
/// it is about to write. The same entry is passed to the oracle as `since`.
pub async fn checked_operations(
    oracle: &dyn QuorumOracle,
    population: u32,
    own: WorkerId,
    value: &LogEntryMap,
) -> CheckedQuery {
    let since = value.min_from(own);
    let mut query = CheckedQuery::default();

    for worker in 0..population {
        if worker == own {
            query.floors.insert(worker, since.unwrap_or(0));
            continue;
        }
        match oracle.checked_operation_floor(worker, since).await {
            Ok(floor) => {
                query.floors.insert(worker, floor);
            }
            Err(e) => {
                warn!(worker, error = %e, "checked floor query failed, worker left out");
                query.failed.push(worker);
            }
        }
    }

    debug!(
        own,
        since = ?since,
        failed = query.failed.len(),
        "collected checked floors"
    );
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sharedlog_core::{OperationId, StoreError};
    use std::collections::HashMap;

    struct FixedOracle {
        floors: HashMap<WorkerId, OperationId>,
        failing: Vec<WorkerId>,
    }

    #[async_trait]
    impl QuorumOracle for FixedOracle {
        async fn checked_operation_floor(
            &self,
            worker: WorkerId,
            _since: Option<OperationId>,
        ) -> Result<OperationId, StoreError> {
            if self.failing.contains(&worker) {
                return Err(StoreError::Timeout {
                    operation: "checked_operation_floor".to_string(),
                    key: worker.to_string(),
                });
            }
            Ok(self.floors.get(&worker).copied().unwrap_or(0))
        }
    }

    #[tokio::test]
    async fn test_own_floor_comes_from_value() {
        let oracle = FixedOracle {
            floors: HashMap::from([(0, 3), (1, 100)]),
            failing: vec![],
        };
        let value: LogEntryMap = [(0, 3), (1, 6)].into_iter().collect();

        let query = checked_operations(&oracle, 3, 1, &value).await;
        assert_eq!(query.floors, HashMap::from([(0, 3), (1, 6), (2, 0)]));
        assert!(!query.is_partial());
    }

    #[tokio::test]
    async fn test_own_floor_defaults_to_zero() {
        let oracle = FixedOracle {
            floors: HashMap::new(),
            failing: vec![],
        };
        let query = checked_operations(&oracle, 2, 1, &LogEntryMap::singleton(0, 4)).await;
        assert_eq!(query.floors.get(&1), Some(&0));
    }

    #[tokio::test]
    async fn test_failed_worker_is_left_out() {
        let oracle = FixedOracle {
            floors: HashMap::from([(0, 5), (2, 9)]),
            failing: vec![2],
        };
        let value: LogEntryMap = [(0, 5), (2, 9)].into_iter().collect();

        let query = checked_operations(&oracle, 3, 1, &value).await;
        assert!(query.is_partial());
        assert_eq!(query.failed, vec![2]);
        assert!(!query.floors.contains_key(&2));

        // Worker 2's entry survives compaction because its floor is unknown.
        let compacted = value
            .with_entry_checked(1, 1, &query.floors, 2)
            .unwrap();
        assert_eq!(compacted.get(2), Some(9));
        assert_eq!(compacted.get(0), None);
    }
}
