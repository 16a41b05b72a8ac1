//! Mergeable per-slot log of the last operation each stressor recorded.
//!
//! A [`LogEntryMap`] maps stressor ids to the highest operation id that
//! stressor has written into a slot. Maps only ever grow through [`LogEntryMap::join`]
//! and [`LogEntryMap::with_entry`], or shrink through compaction once checkers
//! have confirmed the dropped entries.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Identifier of a stressor across the whole cluster.
pub type WorkerId = u32;

/// Per-stressor operation sequence number. The first operation is 1.
pub type OperationId = u64;

/// Highest confirmed operation id per stressor; absent stressors count as 0.
pub type CheckedOperations = HashMap<WorkerId, OperationId>;

/// Immutable worker → operation id map stored as the value of both slot keys.
///
/// The join is pointwise `max`, which makes it idempotent, commutative and
/// associative, so the same fact may sit on the primary and the backup key at
/// once without harm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogEntryMap {
    entries: BTreeMap<WorkerId, OperationId>,
}

impl LogEntryMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map holding a single fact.
    pub fn singleton(worker: WorkerId, operation: OperationId) -> Self {
        LogEntryMap {
            entries: BTreeMap::from([(worker, operation)]),
        }
    }

    /// Number of distinct stressors present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last operation id recorded for `worker`.
    pub fn get(&self, worker: WorkerId) -> Option<OperationId> {
        self.entries.get(&worker).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WorkerId, OperationId)> + '_ {
        self.entries.iter().map(|(w, o)| (*w, *o))
    }

    /// True if the map proves that `worker` performed `operation` (or a later one).
    pub fn covers(&self, worker: WorkerId, operation: OperationId) -> bool {
        self.get(worker).is_some_and(|recorded| recorded >= operation)
    }

    /// Entry of `worker`, used as the lower bound when asking checkers how far
    /// they got. `None` means the stressor has nothing in this value yet.
    pub fn min_from(&self, worker: WorkerId) -> Option<OperationId> {
        self.get(worker)
    }

    /// Union of both maps keeping the larger operation id per stressor.
    pub fn join(&self, other: &LogEntryMap) -> LogEntryMap {
        let (mut joined, smaller) = if self.len() >= other.len() {
            (self.entries.clone(), &other.entries)
        } else {
            (other.entries.clone(), &self.entries)
        };
        for (worker, operation) in smaller {
            joined
                .entry(*worker)
                .and_modify(|current| *current = (*current).max(*operation))
                .or_insert(*operation);
        }
        LogEntryMap { entries: joined }
    }

    /// Join of two optional values; absent values behave as empty maps.
    pub fn join_opt(a: Option<&LogEntryMap>, b: Option<&LogEntryMap>) -> LogEntryMap {
        match (a, b) {
            (Some(a), Some(b)) => a.join(b),
            (Some(v), None) | (None, Some(v)) => v.clone(),
            (None, None) => LogEntryMap::new(),
        }
    }

    /// Copy of this map with `worker`'s entry set to `operation`.
    pub fn with_entry(&self, worker: WorkerId, operation: OperationId) -> LogEntryMap {
        debug_assert!(
            self.get(worker).map_or(true, |previous| previous <= operation),
            "operation ids of worker {} went backwards",
            worker
        );
        let mut entries = self.entries.clone();
        entries.insert(worker, operation);
        LogEntryMap { entries }
    }

    /// Compacting variant of [`LogEntryMap::with_entry`].
    ///
    /// Every entry whose operation id is at most the checked operation of its
    /// stressor is dropped before the new fact is added. Returns `None` when
    /// the result would still hold more than `max_size` entries; the caller
    /// has to give up this attempt and try again later.
    pub fn with_entry_checked(
        &self,
        worker: WorkerId,
        operation: OperationId,
        checked: &CheckedOperations,
        max_size: usize,
    ) -> Option<LogEntryMap> {
        debug_assert!(
            self.get(worker).map_or(true, |previous| previous <= operation),
            "operation ids of worker {} went backwards",
            worker
        );
        let mut entries: BTreeMap<WorkerId, OperationId> = self
            .entries
            .iter()
            .filter(|(w, o)| **o > checked.get(w).copied().unwrap_or(0))
            .map(|(w, o)| (*w, *o))
            .collect();
        entries.insert(worker, operation);

        if entries.len() > max_size {
            None
        } else {
            Some(LogEntryMap { entries })
        }
    }
}

impl FromIterator<(WorkerId, OperationId)> for LogEntryMap {
    fn from_iter<I: IntoIterator<Item = (WorkerId, OperationId)>>(iter: I) -> Self {
        let mut entries = BTreeMap::new();
        for (worker, operation) in iter {
            entries
                .entry(worker)
                .and_modify(|current: &mut OperationId| *current = (*current).max(operation))
                .or_insert(operation);
        }
        LogEntryMap { entries }
    }
}
