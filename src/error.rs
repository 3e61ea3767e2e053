use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::models::Tier;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("unexpected reply from counter store: {0}")]
    Reply(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("directory answered with status {0}")]
    Status(u16),

    #[error("invalid directory url: {0}")]
    Url(String),

    #[error("failed to load client records: {0}")]
    Load(String),
}

// Unavailable and timestamp variants are faults and go through the fail policy
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("missing client identity")]
    IdentityMissing,

    #[error("unknown client identity")]
    IdentityUnknown,

    #[error("{} quota exceeded, retry in {retry_after_ms}ms", .tier.as_str())]
    QuotaExceeded { tier: Tier, retry_after_ms: u64 },

    #[error("counter store unavailable: {0}")]
    CounterStoreUnavailable(String),

    #[error("quota directory unavailable: {0}")]
    QuotaDirectoryUnavailable(String),

    #[error("timestamp {0} is outside the supported calendar range")]
    TimestampOutOfRange(i64),
}

impl GateError {
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            GateError::CounterStoreUnavailable(_)
                | GateError::QuotaDirectoryUnavailable(_)
                | GateError::TimestampOutOfRange(_)
        )
    }

    // Label used for the dependency fault metric
    pub fn dependency(&self) -> &'static str {
        match self {
            GateError::QuotaDirectoryUnavailable(_) => "quota_directory",
            GateError::TimestampOutOfRange(_) => "clock",
            _ => "counter_store",
        }
    }
}

// Whole seconds, rounded up
pub fn retry_after_secs(retry_after_ms: u64) -> u64 {
    retry_after_ms.div_ceil(1000)
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match self {
            GateError::IdentityMissing | GateError::IdentityUnknown => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Unauthorized" })),
            )
                .into_response(),
            GateError::QuotaExceeded {
                tier,
                retry_after_ms,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs(retry_after_ms).to_string())],
                Json(json!({ "message": tier.message() })),
            )
                .into_response(),
            GateError::CounterStoreUnavailable(_)
            | GateError::QuotaDirectoryUnavailable(_)
            | GateError::TimestampOutOfRange(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "message": "Service Unavailable" })),
            )
                .into_response(),
        }
    }
}
