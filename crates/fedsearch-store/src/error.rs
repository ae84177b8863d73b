use thiserror::Error;

/// Result type local to fedsearch-store.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store io error: {0}")]
    Io(String),

    #[error("mailbox lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("invalid store request: {0}")]
    Invalid(String),
}
