mod memory;
mod redis_store;

pub use memory::{InMemoryCounterStore, counter_sweeper};
pub use redis_store::RedisCounterStore;

use async_trait::async_trait;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementOutcome {
    pub accepted: bool,
    // Count after the call; unchanged when the increment was refused
    pub count: u64,
}

impl IncrementOutcome {
    pub fn accepted(count: u64) -> Self {
        Self {
            accepted: true,
            count,
        }
    }

    pub fn rejected(count: u64) -> Self {
        Self {
            accepted: false,
            count,
        }
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    // Must be atomic: add one unless that passes `limit`, never changing the count on refusal.
    // A new key expires after ttl_secs; later increments don't extend it
    async fn try_increment(
        &self,
        key: &str,
        ttl_secs: u64,
        limit: u64,
    ) -> Result<IncrementOutcome, StoreError>;
}
