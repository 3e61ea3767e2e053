use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use clap::ValueEnum;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::ClientConfigCache;
use crate::clock::Clock;
use crate::error::GateError;
use crate::metrics::{
    ADMITTED_TOTAL, DECISION_LATENCY, DEPENDENCY_FAULTS, REJECTED_TOTAL, REQUEST_TOTAL,
    UNAUTHORIZED_TOTAL,
};
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

// Behaviour when the counter store or quota directory is unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailMode {
    Open,
    #[default]
    Closed,
}

// Client id from the header; empty or non-ASCII values count as missing
pub fn client_identity(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

pub struct RequestGate {
    cache: ClientConfigCache,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    fail_mode: FailMode,
}

impl RequestGate {
    pub fn new(
        cache: ClientConfigCache,
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
        fail_mode: FailMode,
    ) -> Self {
        Self {
            cache,
            limiter,
            clock,
            fail_mode,
        }
    }

    pub async fn admit(&self, headers: &HeaderMap) -> Result<(), GateError> {
        REQUEST_TOTAL.inc();

        let Some(client_id) = client_identity(headers) else {
            UNAUTHORIZED_TOTAL.inc();
            return Err(GateError::IdentityMissing);
        };

        let quota = match self.cache.get(client_id).await {
            Ok(Some(quota)) => quota,
            Ok(None) => {
                UNAUTHORIZED_TOTAL.inc();
                tracing::debug!(client_id, "Unknown client");
                return Err(GateError::IdentityUnknown);
            }
            Err(fault) => return self.fall_back(client_id, fault),
        };

        let started = Instant::now();
        let decision = self
            .limiter
            .is_request_allowed(&quota, self.clock.now_millis())
            .await;
        DECISION_LATENCY.observe(started.elapsed().as_secs_f64());

        match decision {
            Ok(decision) if decision.allowed => {
                ADMITTED_TOTAL.inc();
                Ok(())
            }
            Ok(decision) => {
                let tier = decision.limit_type.ok_or_else(|| {
                    GateError::CounterStoreUnavailable("rejection without a tier".into())
                })?;
                let retry_after_ms = decision.retry_after_ms.unwrap_or_default();
                REJECTED_TOTAL.with_label_values(&[tier.as_str()]).inc();
                tracing::debug!(client_id, tier = tier.as_str(), retry_after_ms, "Request throttled");
                Err(GateError::QuotaExceeded {
                    tier,
                    retry_after_ms,
                })
            }
            Err(fault) => self.fall_back(client_id, fault),
        }
    }

    fn fall_back(&self, client_id: &str, fault: GateError) -> Result<(), GateError> {
        DEPENDENCY_FAULTS
            .with_label_values(&[fault.dependency()])
            .inc();

        match self.fail_mode {
            FailMode::Open => {
                tracing::warn!(client_id, error = %fault, "Admission check failed, failing open");
                ADMITTED_TOTAL.inc();
                Ok(())
            }
            FailMode::Closed => {
                tracing::error!(client_id, error = %fault, "Admission check failed, failing closed");
                Err(fault)
            }
        }
    }
}

// axum middleware: route_layer(from_fn_with_state(state, request_gate))
pub async fn request_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    match state.gate.admit(&parts.headers).await {
        Ok(()) => next.run(Request::from_parts(parts, body)).await,
        Err(rejection) => rejection.into_response(),
    }
}
