use sharedlog_core::{CodecError, Operation, StoreError};

/// Errors surfaced by the shared-log write path.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LogicError {
    /// A key holds a value that is not a log entry map.
    #[error("Corrupted value under key '{key}'")]
    Corruption {
        key: String,
        #[source]
        source: CodecError,
    },

    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The operation kind cannot be recorded in the shared log.
    #[error("Operation '{0}' is not supported by the shared log logic")]
    UnsupportedOperation(Operation),

    /// A computed value could not be encoded.
    #[error("Failed to encode log value")]
    Codec(#[from] CodecError),

    /// Transactional mode was configured without a transaction source.
    #[error("transaction_size is {0} but no transaction source was provided")]
    TransactionsUnavailable(usize),
}

impl LogicError {
    /// Returns true if the worker must stop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        match self {
            LogicError::Store(e) => !e.is_transient(),
            _ => true,
        }
    }

    /// The operation kind carried by an unsupported-operation error.
    pub fn unsupported_operation(&self) -> Option<Operation> {
        match self {
            LogicError::UnsupportedOperation(op) => Some(*op),
            _ => None,
        }
    }
}
