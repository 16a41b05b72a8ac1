/// Errors returned by store capabilities.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Connection to the store failed.
    #[error("Connection to store '{store}' failed")]
    ConnectionFailed {
        store: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out for key: {key}")]
    Timeout { operation: String, key: String },

    /// A transaction could not commit because a key it read changed meanwhile.
    #[error("Transaction conflict on key: {0}")]
    TransactionConflict(String),

    /// The transaction was already committed or rolled back.
    #[error("Transaction is not active")]
    TransactionNotActive,

    /// Other store-specific error.
    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Returns true if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionFailed { .. }
                | StoreError::Timeout { .. }
                | StoreError::TransactionConflict(_)
        )
    }
}
