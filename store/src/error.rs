use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that distinguish retriable backend failures from programming
/// or data errors that retrying cannot fix.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key exists but holds a different value kind (e.g. a list
    /// operation against a hash).
    #[error("key `{key}` holds a different value kind")]
    WrongType { key: String },

    /// A stored value could not be decoded.
    #[error("corrupt value at `{key}`: {reason}")]
    Corrupt { key: String, reason: String },

    /// A temporary backend failure; safe to retry with backoff.
    #[error("transient store failure: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn wrong_type(key: impl Into<String>) -> Self {
        StoreError::WrongType { key: key.into() }
    }

    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Implemented by error types whose failures may be worth retrying.
/// [`retry::with_backoff`](crate::retry::with_backoff) only retries
/// errors reporting `true` here.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}
