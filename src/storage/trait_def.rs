use crate::models::CounterOp;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend unreachable or the command was rejected
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
    /// Backend answered with a reply of the wrong shape or type
    #[error("unexpected reply: {0}")]
    Protocol(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Sparse counter store: scope key -> field -> counter
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Check connectivity / prepare the backend
    async fn init(&self) -> Result<()>;

    /// Increment one field on its own and return the new value
    async fn increment(&self, scope: &str, field: &str, delta: i64) -> StorageResult<u64>;

    /// Apply every increment as one all-or-nothing unit.
    ///
    /// Returns the post-increment value of each op, in op order.
    async fn increment_batch(&self, ops: &[CounterOp]) -> StorageResult<Vec<u64>>;

    /// Read every counter of a scope; an unknown scope is an empty map
    async fn get_all(&self, scope: &str) -> StorageResult<BTreeMap<String, u64>>;
}

/// Mutual-exclusion primitive shared by every process using the same store
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Take `key` for `lease` if nobody holds it. Returns false when held.
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> StorageResult<bool>;

    /// Drop `key` if it is still held with `token`. Returns false otherwise.
    async fn release(&self, key: &str, token: &str) -> StorageResult<bool>;
}
