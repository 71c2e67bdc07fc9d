//! Click aggregation: enrich, then count under the (site, resource) lock
//!
//! Every click for the same site and resource goes through one store-backed
//! lock, so the snapshot read back for a click is exactly the state its own
//! increments produced. Clicks on different keys proceed in parallel. No
//! counter value is cached in-process; the store is the only source of truth.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::analytics::enrich::Enricher;
use crate::analytics::models::GeoLocation;
use crate::analytics::{keys, snapshot, transaction};
use crate::error::ClickResult;
use crate::models::{ClickEvent, EnrichedEvent};
use crate::storage::{CounterStore, LockManager};

pub struct ClickAggregator {
    enricher: Enricher,
    store: Arc<dyn CounterStore>,
    locks: LockManager,
    track_ip: bool,
}

impl ClickAggregator {
    pub fn new(
        enricher: Enricher,
        store: Arc<dyn CounterStore>,
        locks: LockManager,
        track_ip: bool,
    ) -> Self {
        Self {
            enricher,
            store,
            locks,
            track_ip,
        }
    }

    pub fn tracks_ip(&self) -> bool {
        self.track_ip
    }

    /// Count one click and return it enriched with its snapshot.
    ///
    /// Fails without a snapshot when the lock cannot be taken in time or
    /// the store write fails; nothing is retried.
    pub async fn process_click(
        &self,
        site: &str,
        resource: &str,
        ip: &str,
        user_agent: &str,
    ) -> ClickResult<EnrichedEvent> {
        let click = ClickEvent::new(site, resource, ip, user_agent)?;
        self.record(click).await
    }

    /// Count an already validated click
    pub async fn record(&self, click: ClickEvent) -> ClickResult<EnrichedEvent> {
        let mut event = self.enricher.enrich(click);

        let ops = keys::derive(&event, self.track_ip);
        let flags = keys::flag_ops(&event);
        let lock_key = keys::lock_key(&event);
        let readback_len = keys::readback_len(self.track_ip);

        let values = self
            .locks
            .with_lock(&lock_key, || {
                transaction::apply(self.store.as_ref(), &flags, &ops, readback_len)
            })
            .await
            .inspect_err(|err| {
                error!(
                    site = %event.click.site(),
                    resource = %event.click.resource(),
                    error = %err,
                    "failed to count click"
                )
            })?;

        let stat = snapshot::assemble(&values, self.track_ip)?;
        debug!(
            site = %event.click.site(),
            resource = %event.click.resource(),
            count = stat.uri,
            "click counted"
        );

        event.stat = Some(stat);
        Ok(event)
    }

    /// Every counter of a scope (a site identifier or `"global"`).
    ///
    /// Unlocked read; it may interleave with clicks in flight.
    pub async fn get_counters(&self, scope: &str) -> ClickResult<BTreeMap<String, u64>> {
        Ok(self.store.get_all(scope).await?)
    }

    /// Location of `ip` through the configured resolver
    pub fn locate(&self, ip: &str) -> Option<GeoLocation> {
        self.enricher.locate(ip)
    }
}
