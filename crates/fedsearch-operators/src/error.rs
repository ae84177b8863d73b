use fedsearch_store::StoreError;
use thiserror::Error;

/// Result type local to fedsearch-operators.
pub type Result<T> = std::result::Result<T, OpError>;

#[derive(Debug, Error)]
pub enum OpError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The text index returned an id the relational candidates did not contain.
    #[error("Inconsistent DB/Index query results: {0}")]
    Inconsistent(String),

    #[error("operation state error: {0}")]
    State(String),
}
