//! The per-click write against the counter store, run under the key's lock

use tracing::warn;

use crate::error::{ClickError, ClickResult};
use crate::models::CounterOp;
use crate::storage::CounterStore;

/// Apply one click's increments and return the snapshot values.
///
/// `flags` are applied first, one by one, and their failures are only
/// logged. `ops` go to the store as a single atomic batch; the first
/// `readback_len` post-increment values are returned.
pub async fn apply(
    store: &dyn CounterStore,
    flags: &[CounterOp],
    ops: &[CounterOp],
    readback_len: usize,
) -> ClickResult<Vec<u64>> {
    for flag in flags {
        if let Err(err) = store
            .increment(flag.scope.key(), &flag.field, flag.delta)
            .await
        {
            warn!(
                scope = %flag.scope,
                field = %flag.field,
                error = %err,
                "failed to increment flag counter"
            );
        }
    }

    let mut values = store.increment_batch(ops).await?;

    if values.len() > ops.len() {
        return Err(ClickError::Protocol(format!(
            "{} values for {} increments",
            values.len(),
            ops.len()
        )));
    }
    if values.len() < ops.len() {
        return Err(ClickError::IncompleteReadback {
            expected: ops.len(),
            got: values.len(),
        });
    }

    values.truncate(readback_len);
    Ok(values)
}
