// Tiers run global, second, month and stop at the first refusal. A request
// keeps the slot of every tier it passed, so the global tier counts every
// request that reaches the global check.

use chrono::{DateTime, Datelike, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::GateError;
use crate::models::{ClientQuota, Decision, Tier};
use crate::store::CounterStore;

const WINDOW_MS: i64 = 1000;
const SECOND_WINDOW_TTL_SECS: u64 = 1;

pub fn second_bucket(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(WINDOW_MS)
}

// Time left in the current one-second window, 1..=1000
pub fn retry_after_second(timestamp_ms: i64) -> u64 {
    (WINDOW_MS - timestamp_ms.rem_euclid(WINDOW_MS)) as u64
}

pub fn global_key(second: i64) -> String {
    format!("rate_limit:global:{second}")
}

pub fn second_key(client_id: &str, second: i64) -> String {
    format!("rate_limit:second:{client_id}:{second}")
}

pub fn month_key(client_id: &str, month: i64) -> String {
    format!("rate_limit:month:{client_id}:{month}")
}

// UTC calendar month; bucket and reset instant come from one computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    // year * 12 + zero-based month
    pub bucket: i64,
    // 00:00:00.000 UTC on the first day of the following month
    pub resets_at_ms: i64,
}

impl MonthWindow {
    pub fn containing(timestamp_ms: i64) -> Option<Self> {
        let at = DateTime::from_timestamp_millis(timestamp_ms)?;
        let (year, month) = (at.year(), at.month());
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };

        let resets_at_ms = NaiveDate::from_ymd_opt(next_year, next_month, 1)?
            .and_hms_opt(0, 0, 0)?
            .and_utc()
            .timestamp_millis();

        Some(Self {
            bucket: i64::from(year) * 12 + i64::from(month) - 1,
            resets_at_ms,
        })
    }

    pub fn retry_after_ms(&self, timestamp_ms: i64) -> u64 {
        self.resets_at_ms.saturating_sub(timestamp_ms).max(0) as u64
    }

    // Counter lifetime: rest of the month, rounded up, at least a second
    pub fn ttl_secs(&self, timestamp_ms: i64) -> u64 {
        self.retry_after_ms(timestamp_ms).div_ceil(1000).max(1)
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    global_limit: u64,
    call_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, global_limit: u64, call_timeout: Duration) -> Self {
        Self {
            store,
            global_limit,
            call_timeout,
        }
    }

    // Quota rejections are Ok decisions, Err means the counter store failed or timed out
    pub async fn is_request_allowed(
        &self,
        quota: &ClientQuota,
        timestamp_ms: i64,
    ) -> Result<Decision, GateError> {
        let second = second_bucket(timestamp_ms);

        if !self
            .consume(&global_key(second), SECOND_WINDOW_TTL_SECS, self.global_limit)
            .await?
        {
            return Ok(Decision::rejected(
                Tier::Global,
                retry_after_second(timestamp_ms),
            ));
        }

        if !self
            .consume(
                &second_key(&quota.client_id, second),
                SECOND_WINDOW_TTL_SECS,
                quota.limit_per_second,
            )
            .await?
        {
            return Ok(Decision::rejected(
                Tier::Second,
                retry_after_second(timestamp_ms),
            ));
        }

        let month = MonthWindow::containing(timestamp_ms)
            .ok_or(GateError::TimestampOutOfRange(timestamp_ms))?;

        if !self
            .consume(
                &month_key(&quota.client_id, month.bucket),
                month.ttl_secs(timestamp_ms),
                quota.limit_per_month,
            )
            .await?
        {
            return Ok(Decision::rejected(
                Tier::Month,
                month.retry_after_ms(timestamp_ms),
            ));
        }

        Ok(Decision::admitted())
    }

    // One bounded round trip to the counter store
    async fn consume(&self, key: &str, ttl_secs: u64, limit: u64) -> Result<bool, GateError> {
        match timeout(self.call_timeout, self.store.try_increment(key, ttl_secs, limit)).await {
            Ok(Ok(outcome)) => Ok(outcome.accepted),
            Ok(Err(e)) => Err(GateError::CounterStoreUnavailable(e.to_string())),
            Err(_) => Err(GateError::CounterStoreUnavailable(format!(
                "increment of {key} timed out after {:?}",
                self.call_timeout
            ))),
        }
    }
}
