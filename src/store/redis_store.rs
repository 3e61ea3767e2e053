use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::fmt;

use super::{CounterStore, IncrementOutcome};
use crate::error::StoreError;

// KEYS[1] counter key, ARGV[1] ttl seconds, ARGV[2] ceiling.
// Returns {accepted, count}.
const TRY_INCREMENT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('TTL', KEYS[1]) == -1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
if count > tonumber(ARGV[2]) then
  count = redis.call('DECR', KEYS[1])
  return {0, count}
end
return {1, count}
"#;

pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Script,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            script: Script::new(TRY_INCREMENT),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn try_increment(
        &self,
        key: &str,
        ttl_secs: u64,
        limit: u64,
    ) -> Result<IncrementOutcome, StoreError> {
        let mut conn = self.connection.clone();

        let (accepted, count): (i64, i64) = self
            .script
            .key(key)
            .arg(ttl_secs.max(1))
            .arg(limit)
            .invoke_async(&mut conn)
            .await?;

        let count = u64::try_from(count)
            .map_err(|_| StoreError::Reply(format!("negative count {count} for {key}")))?;

        match accepted {
            1 => Ok(IncrementOutcome::accepted(count)),
            0 => Ok(IncrementOutcome::rejected(count)),
            other => Err(StoreError::Reply(format!("unknown accept flag {other}"))),
        }
    }
}
