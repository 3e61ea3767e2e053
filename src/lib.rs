pub mod cache;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod store;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::gate::request_gate;
use crate::handlers::{health_handler, metrics_handler, notifications_handler};
use crate::state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/notifications", post(notifications_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), request_gate));

    Router::new()
        .merge(protected)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// RUST_LOG filter, default info. LOG_JSON=true switches to JSON lines
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
