use std::time::Duration;
use thiserror::Error;

use crate::storage::{LockError, StorageError};

/// Failure of a click-processing attempt.
///
/// None of these are retried internally; a retry by the caller counts as a
/// new click.
#[derive(Debug, Error)]
pub enum ClickError {
    #[error("invalid click: {0}")]
    InvalidClick(&'static str),

    /// The critical section never ran, so no counter changed
    #[error("timed out after {waited:?} waiting for lock {key}")]
    LockTimeout { key: String, waited: Duration },

    #[error("counter store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("unexpected counter store reply: {0}")]
    Protocol(String),

    /// The increments may have been applied but the counts cannot be trusted
    #[error("counter store returned {got} of {expected} expected values")]
    IncompleteReadback { expected: usize, got: usize },
}

pub type ClickResult<T> = Result<T, ClickError>;

impl From<StorageError> for ClickError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Backend(e) => ClickError::Store(e),
            StorageError::Protocol(msg) => ClickError::Protocol(msg),
        }
    }
}

impl From<LockError> for ClickError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { key, waited } => ClickError::LockTimeout { key, waited },
            LockError::Storage(e) => e.into(),
        }
    }
}
