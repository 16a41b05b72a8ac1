use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sharedlog_core::{OperationId, QuorumOracle, StoreError, WorkerId};

/// Operations confirmed by each checker.
///
/// Checker `c` confirming `(w, o)` states that it observed every operation
/// of worker `w` up to and including `o`. The quorum floor of a worker is
/// the lowest confirmation across all checkers.
#[derive(Debug)]
pub struct CheckerRegistry {
    confirmed: RwLock<Vec<HashMap<WorkerId, OperationId>>>,
}

impl CheckerRegistry {
    pub fn new(checkers: usize) -> Self {
        CheckerRegistry {
            confirmed: RwLock::new(vec![HashMap::new(); checkers]),
        }
    }

    pub fn checkers(&self) -> usize {
        self.confirmed.read().len()
    }

    /// Advance the confirmation of `checker` for `worker`. Never moves back.
    pub fn confirm(&self, checker: usize, worker: WorkerId, operation: OperationId) {
        let mut confirmed = self.confirmed.write();
        if let Some(floors) = confirmed.get_mut(checker) {
            let floor = floors.entry(worker).or_insert(0);
            *floor = (*floor).max(operation);
        }
    }

    pub fn confirmed_by(&self, checker: usize, worker: WorkerId) -> OperationId {
        self.confirmed
            .read()
            .get(checker)
            .and_then(|floors| floors.get(&worker).copied())
            .unwrap_or(0)
    }

    pub fn floor(&self, worker: WorkerId) -> OperationId {
        self.confirmed
            .read()
            .iter()
            .map(|floors| floors.get(&worker).copied().unwrap_or(0))
            .min()
            .unwrap_or(0)
    }
}

#[async_trait]
impl QuorumOracle for CheckerRegistry {
    async fn checked_operation_floor(
        &self,
        worker: WorkerId,
        _since: Option<OperationId>,
    ) -> Result<OperationId, StoreError> {
        Ok(self.floor(worker))
    }
}
