use crate::models::CounterOp;
use crate::storage::{CounterStore, LockBackend, StorageError, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct HeldLock {
    token: String,
    expires_at: Instant,
}

/// In-process store for single-instance deployments and tests.
///
/// Counters sit behind one lock so a batch spanning several scopes commits
/// as a unit. Locks only exclude tasks of this process.
#[derive(Default)]
pub struct MemoryStore {
    scopes: RwLock<HashMap<String, HashMap<String, u64>>>,
    locks: DashMap<String, HeldLock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_delta(current: u64, delta: i64) -> StorageResult<u64> {
    current
        .checked_add_signed(delta)
        .ok_or_else(|| StorageError::Backend(anyhow!("counter out of range")))
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn increment(&self, scope: &str, field: &str, delta: i64) -> StorageResult<u64> {
        let mut scopes = self.scopes.write().await;
        let counter = scopes
            .entry(scope.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert(0);
        *counter = apply_delta(*counter, delta)?;
        Ok(*counter)
    }

    async fn increment_batch(&self, ops: &[CounterOp]) -> StorageResult<Vec<u64>> {
        let mut scopes = self.scopes.write().await;

        // Validate the whole batch before touching anything
        let mut staged: HashMap<(&str, &str), u64> = HashMap::new();
        let mut values = Vec::with_capacity(ops.len());
        for op in ops {
            let key = (op.scope.key(), op.field.as_str());
            let current = match staged.get(&key) {
                Some(v) => *v,
                None => scopes
                    .get(key.0)
                    .and_then(|fields| fields.get(key.1))
                    .copied()
                    .unwrap_or(0),
            };
            let next = apply_delta(current, op.delta)?;
            staged.insert(key, next);
            values.push(next);
        }

        for ((scope, field), value) in staged {
            scopes
                .entry(scope.to_string())
                .or_default()
                .insert(field.to_string(), value);
        }

        Ok(values)
    }

    async fn get_all(&self, scope: &str) -> StorageResult<BTreeMap<String, u64>> {
        let scopes = self.scopes.read().await;
        Ok(scopes
            .get(scope)
            .map(|fields| fields.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl LockBackend for MemoryStore {
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> StorageResult<bool> {
        let now = Instant::now();
        let held = HeldLock {
            token: token.to_string(),
            expires_at: now + lease,
        };

        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at <= now {
                    entry.insert(held);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(held);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, token: &str) -> StorageResult<bool> {
        let now = Instant::now();
        Ok(self
            .locks
            .remove_if(key, |_, held| held.token == token && held.expires_at > now)
            .is_some())
    }
}
