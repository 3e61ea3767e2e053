use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use super::{CounterStore, IncrementOutcome};
use crate::clock::Clock;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at_ms: i64,
}

// Process-local counter store. Atomic because the whole
// check-and-increment runs under the DashMap shard lock for the key.
pub struct InMemoryCounterStore {
    counters: DashMap<String, CounterEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    // Current count for a key, None if absent or expired
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_millis();
        self.counters
            .get(key)
            .filter(|entry| entry.expires_at_ms > now)
            .map(|entry| entry.count)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    // Drop every expired counter, returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.counters.len();
        self.counters.retain(|_, entry| entry.expires_at_ms > now);
        before.saturating_sub(self.counters.len())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn try_increment(
        &self,
        key: &str,
        ttl_secs: u64,
        limit: u64,
    ) -> Result<IncrementOutcome, StoreError> {
        let now = self.clock.now_millis();
        let expires_at_ms = now.saturating_add(ttl_secs.saturating_mul(1000) as i64);

        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(CounterEntry {
                count: 0,
                expires_at_ms,
            });

        // expired? start a fresh window
        if entry.expires_at_ms <= now {
            *entry = CounterEntry {
                count: 0,
                expires_at_ms,
            };
        }

        if entry.count >= limit {
            return Ok(IncrementOutcome::rejected(entry.count));
        }

        entry.count += 1;
        Ok(IncrementOutcome::accepted(entry.count))
    }
}

// Sweeps expired counters - runs for the lifetime of the process
pub async fn counter_sweeper(store: Arc<InMemoryCounterStore>, every: Duration) {
    let mut interval = interval(every);

    tracing::info!(interval = ?every, "Counter sweeper started");

    loop {
        interval.tick().await;
        let removed = store.purge_expired();
        if removed > 0 {
            tracing::debug!(removed, remaining = store.len(), "Swept expired counters");
        }
    }
}
