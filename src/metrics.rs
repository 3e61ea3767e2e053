use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of gated requests").unwrap();
    pub static ref ADMITTED_TOTAL: Counter =
        register_counter!("gateway_admitted_total", "Requests passed to the downstream handler")
            .unwrap();
    pub static ref REJECTED_TOTAL: CounterVec = register_counter_vec!(
        "gateway_rejected_total",
        "Requests rejected by a quota tier",
        &["tier"]
    )
    .unwrap();
    pub static ref UNAUTHORIZED_TOTAL: Counter = register_counter!(
        "gateway_unauthorized_total",
        "Requests with a missing or unknown client id"
    )
    .unwrap();
    pub static ref DEPENDENCY_FAULTS: CounterVec = register_counter_vec!(
        "gateway_dependency_faults_total",
        "Failed or timed out calls to external dependencies",
        &["dependency"]
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("gateway_client_cache_hits_total", "Client config cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("gateway_client_cache_misses_total", "Client config cache misses")
            .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("gateway_client_cache_size", "Current number of cached client quotas")
            .unwrap();
    pub static ref DECISION_LATENCY: Histogram = register_histogram!(
        "gateway_decision_latency_seconds",
        "Time spent deciding whether to admit a request"
    )
    .unwrap();
}
