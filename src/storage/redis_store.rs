use crate::models::CounterOp;
use crate::storage::{CounterStore, LockBackend, StorageError, StorageResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Script, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Compare-and-delete so a lock is only dropped by the task holding it
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Prefix keeping lock keys apart from counter hashes
const LOCK_PREFIX: &str = "clickstat:lock:";

/// Redis-backed store: one hash per scope, `HINCRBY` inside `MULTI/EXEC`
/// for batches and `SET NX PX` for locks.
pub struct RedisStore {
    connection: MultiplexedConnection,
    release_script: Script,
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .with_context(|| format!("Invalid Redis URL {}", redis_url))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", redis_url))?;

        Ok(Self {
            connection,
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }

    fn lock_key(key: &str) -> String {
        format!("{}{}", LOCK_PREFIX, key)
    }
}

fn backend(err: redis::RedisError) -> StorageError {
    StorageError::Backend(err.into())
}

fn counter_value(value: &Value) -> StorageResult<u64> {
    match value {
        Value::Int(n) => u64::try_from(*n)
            .map_err(|_| StorageError::Protocol(format!("negative counter {}", n))),
        other => Err(StorageError::Protocol(format!(
            "expected integer, got {:?}",
            other
        ))),
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn init(&self) -> Result<()> {
        let mut con = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut con)
            .await
            .context("Redis did not answer PING")?;
        Ok(())
    }

    async fn increment(&self, scope: &str, field: &str, delta: i64) -> StorageResult<u64> {
        let mut con = self.connection.clone();
        let value: Value = redis::cmd("HINCRBY")
            .arg(scope)
            .arg(field)
            .arg(delta)
            .query_async(&mut con)
            .await
            .map_err(backend)?;
        counter_value(&value)
    }

    async fn increment_batch(&self, ops: &[CounterOp]) -> StorageResult<Vec<u64>> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            pipe.cmd("HINCRBY")
                .arg(op.scope.key())
                .arg(&op.field)
                .arg(op.delta);
        }

        let mut con = self.connection.clone();
        let reply: Value = pipe.query_async(&mut con).await.map_err(backend)?;

        match reply {
            Value::Array(items) => items.iter().map(counter_value).collect(),
            other => Err(StorageError::Protocol(format!(
                "expected EXEC array, got {:?}",
                other
            ))),
        }
    }

    async fn get_all(&self, scope: &str) -> StorageResult<BTreeMap<String, u64>> {
        let mut con = self.connection.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(scope)
            .query_async(&mut con)
            .await
            .map_err(backend)?;

        raw.into_iter()
            .map(|(field, value)| {
                value
                    .parse::<u64>()
                    .map(|n| (field, n))
                    .map_err(|_| StorageError::Protocol(format!("non-counter value {:?}", value)))
            })
            .collect()
    }
}

#[async_trait]
impl LockBackend for RedisStore {
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> StorageResult<bool> {
        let mut con = self.connection.clone();
        let lease_ms = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::lock_key(key))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut con)
            .await
            .map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> StorageResult<bool> {
        let mut con = self.connection.clone();
        let deleted: i64 = self
            .release_script
            .key(Self::lock_key(key))
            .arg(token)
            .invoke_async(&mut con)
            .await
            .map_err(backend)?;
        Ok(deleted == 1)
    }
}
