pub mod lock;
pub mod memory;
pub mod redis_store;
pub mod trait_def;

pub use lock::{LockError, LockManager, LockOptions, LockToken};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use trait_def::{CounterStore, LockBackend, StorageError, StorageResult};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

/// Open the configured backend and check it is reachable.
///
/// The same backend serves counters and locks.
pub async fn connect(config: &StoreConfig) -> Result<(Arc<dyn CounterStore>, Arc<dyn LockBackend>)> {
    let (store, locks): (Arc<dyn CounterStore>, Arc<dyn LockBackend>) = match config.backend {
        StoreBackend::Redis => {
            info!("Using Redis counter store");
            let redis = Arc::new(RedisStore::new(&config.url).await?);
            (redis.clone(), redis)
        }
        StoreBackend::Memory => {
            info!("Using in-memory counter store (locks are local to this process)");
            let memory = Arc::new(MemoryStore::new());
            (memory.clone(), memory)
        }
    };

    store.init().await?;
    Ok((store, locks))
}
