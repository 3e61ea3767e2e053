use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use quota_gateway::cache::ClientConfigCache;
use quota_gateway::clock::{Clock, SystemClock};
use quota_gateway::config::Args;
use quota_gateway::directory::{HttpQuotaDirectory, InMemoryQuotaDirectory, QuotaDirectory};
use quota_gateway::gate::RequestGate;
use quota_gateway::rate_limit::RateLimiter;
use quota_gateway::state::AppState;
use quota_gateway::store::{CounterStore, InMemoryCounterStore, RedisCounterStore, counter_sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quota_gateway::init_tracing();

    // parse cli arguments
    let args = Args::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn CounterStore> = match &args.redis_url {
        Some(url) => {
            tracing::info!(%url, "Using Redis counter store");
            Arc::new(RedisCounterStore::connect(url).await?)
        }
        None => {
            tracing::warn!("No Redis configured, counters are local to this process");
            let store = Arc::new(InMemoryCounterStore::new(clock.clone()));
            tokio::spawn(counter_sweeper(
                store.clone(),
                Duration::from_secs(args.sweep_interval.max(1)),
            ));
            store
        }
    };

    let directory: Arc<dyn QuotaDirectory> = match (&args.directory_url, &args.clients_file) {
        (Some(url), _) => {
            tracing::info!(%url, "Using remote quota directory");
            Arc::new(HttpQuotaDirectory::new(url, args.call_timeout())?)
        }
        (None, Some(path)) => Arc::new(InMemoryQuotaDirectory::from_file(path)?),
        (None, None) => {
            tracing::warn!("No quota directory configured, every client is unknown");
            Arc::new(InMemoryQuotaDirectory::new())
        }
    };

    let cache = ClientConfigCache::new(directory, clock.clone(), args.cache_settings());
    let limiter = RateLimiter::new(store, args.global_limit, args.call_timeout());
    let gate = RequestGate::new(cache, limiter, clock, args.fail_mode);
    let state = Arc::new(AppState::new(gate));

    let app = quota_gateway::app(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        port = args.port,
        global_limit = args.global_limit,
        cache_ttl_secs = args.client_cache_ttl,
        fail_mode = ?args.fail_mode,
        "Gateway listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
