//! Distributed mutual exclusion on top of a [`LockBackend`]
//!
//! The backend only offers a non-blocking try/release pair; this module adds
//! the bounded wait, the random ownership token and the release-on-exit
//! guarantee around a critical section.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::{LockBackend, StorageError};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock {key}")]
    Timeout { key: String, waited: Duration },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// How long a held lock survives without being released.
    ///
    /// Must exceed the slowest critical section. A section that outlives
    /// its lease still returns its result, but another holder may have run
    /// the same section concurrently; release logs `lease_expired = true`.
    pub lease: Duration,
    /// Upper bound on waiting for a contended lock
    pub acquire_timeout: Duration,
    /// Base delay between attempts, jittered up to twice this value
    pub retry_delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lease: Duration::from_millis(8000),
            acquire_timeout: Duration::from_millis(10_000),
            retry_delay: Duration::from_millis(20),
        }
    }
}

/// Proof of holding a lock, consumed by [`LockManager::release`].
///
/// Dropping a token that was never released (a cancelled section) spawns
/// the release on the current runtime instead of waiting for the lease.
pub struct LockToken {
    key: String,
    value: String,
    acquired_at: Instant,
    backend: Arc<dyn LockBackend>,
    released: bool,
}

impl LockToken {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockToken")
            .field("key", &self.key)
            .field("acquired_at", &self.acquired_at)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "lock dropped outside a runtime, left to lease expiry");
            return;
        };

        let backend = Arc::clone(&self.backend);
        let key = std::mem::take(&mut self.key);
        let value = std::mem::take(&mut self.value);
        runtime.spawn(async move {
            match backend.release(&key, &value).await {
                Ok(_) => debug!(key = %key, "abandoned lock released"),
                Err(err) => warn!(key = %key, error = %err, "failed to release abandoned lock"),
            }
        });
    }
}

#[derive(Clone)]
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    options: LockOptions,
}

impl LockManager {
    pub fn new(backend: Arc<dyn LockBackend>, options: LockOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Wait for `key` until it is ours or the acquire timeout elapses
    pub async fn acquire(&self, key: &str) -> Result<LockToken, LockError> {
        let token = format!("{:032x}", rand::random::<u128>());
        let started = Instant::now();

        loop {
            if self
                .backend
                .try_acquire(key, &token, self.options.lease)
                .await?
            {
                return Ok(LockToken {
                    key: key.to_string(),
                    value: token,
                    acquired_at: Instant::now(),
                    backend: Arc::clone(&self.backend),
                    released: false,
                });
            }

            let waited = started.elapsed();
            if waited >= self.options.acquire_timeout {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited,
                });
            }

            let remaining = self.options.acquire_timeout - waited;
            tokio::time::sleep(self.next_delay().min(remaining)).await;
        }
    }

    /// Release a held lock. Returns false when the lease had already expired,
    /// in which case another holder may have overlapped with this one.
    pub async fn release(&self, mut token: LockToken) -> Result<bool, LockError> {
        let released = self.backend.release(&token.key, &token.value).await;
        token.released = true;

        let released = released?;
        if !released {
            warn!(
                key = %token.key,
                held_ms = millis(token.acquired_at.elapsed()),
                lease_ms = millis(self.options.lease),
                lease_expired = true,
                "lock lease expired before release"
            );
        }
        Ok(released)
    }

    /// Run `section` while holding `key`.
    ///
    /// The lock is released whether the section succeeds, fails or is
    /// dropped; a release failure is logged and never masks the section's
    /// own result.
    pub async fn with_lock<T, E, F, Fut>(&self, key: &str, section: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let token = self.acquire(key).await?;
        debug!(key = %key, "lock acquired");

        let result = section().await;

        if let Err(err) = self.release(token).await {
            warn!(key = %key, error = %err, "failed to release lock");
        }

        result
    }

    fn next_delay(&self) -> Duration {
        let base = millis(self.options.retry_delay);
        let jitter = rand::random::<u64>() % base.saturating_add(1);
        Duration::from_millis(base.saturating_add(jitter))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
