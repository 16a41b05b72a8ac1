//! Shared-log write logic.
//!
//! Every logical operation of a worker is recorded as a `(worker, operation)`
//! fact in a [`LogEntryMap`](sharedlog_core::LogEntryMap) stored under one of
//! two keys (primary or its bitwise complement). Puts land on the primary,
//! removes on the backup, and the other side is cleared opportunistically, so
//! each fact is visible in at least one of the two keys at all times.

pub mod checked;
mod control;
mod error;
mod logic;
mod recorded;
mod stats;
pub mod stressor;

pub use checked::{checked_operations, CheckedQuery};
pub use control::WorkerControl;
pub use error::LogicError;
pub use logic::{LogicSettings, Outcome, PendingCleanup, SharedLogLogic, WriteSide};
pub use stats::{LogicStats, LogicStatsSnapshot};
pub use stressor::{CompletedOperation, KeyRange, Stressor, StressorReport};
