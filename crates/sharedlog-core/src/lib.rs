pub mod codec;
mod error;
mod keys;
mod log_value;
mod operation;
mod stats;
mod traits;

pub use codec::{decode, encode, CodecError};
pub use error::StoreError;
pub use keys::{backup_key_id, KeyGenerator, PrefixKeyGenerator};
pub use log_value::{CheckedOperations, LogEntryMap, OperationId, WorkerId};
pub use operation::Operation;
pub use stats::{create_stats, OperationCounters, OperationStats, SharedStats, StatsSnapshot};
pub use traits::{ConditionalStore, OperationRecorder, QuorumOracle, Transaction, Transactional};
