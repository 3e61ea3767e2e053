use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheSettings;
use crate::gate::FailMode;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "quota-gateway")]
#[command(about = "Multi-tier request admission gateway")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // System-wide requests per second, all clients together
    #[arg(long, env = "GLOBAL_REQUEST_LIMIT", default_value_t = 1000)]
    pub global_limit: u64,

    // Client quota cache TTL in seconds
    #[arg(long, env = "CLIENT_CACHE_TTL", default_value_t = 3600)]
    pub client_cache_ttl: u64,

    // Max cached client quotas
    #[arg(long, env = "CLIENT_CACHE_CAPACITY", default_value_t = 10_000)]
    pub client_cache_capacity: usize,

    // Seconds an unknown client id is remembered, 0 turns it off
    #[arg(long, env = "NEGATIVE_CACHE_TTL", default_value_t = 0)]
    pub negative_cache_ttl: u64,

    // Counter store, e.g. "redis://127.0.0.1/". In-process counters when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    // Quota directory base url. In-process directory when unset
    #[arg(long, env = "QUOTA_DIRECTORY_URL")]
    pub directory_url: Option<String>,

    // JSON array of client records for the in-process directory
    #[arg(long, env = "CLIENTS_FILE")]
    pub clients_file: Option<PathBuf>,

    // Bound on every counter store / directory call
    #[arg(long, env = "CALL_TIMEOUT_MS", default_value_t = 250)]
    pub call_timeout_ms: u64,

    // Behaviour when a dependency fails: open admits, closed refuses
    #[arg(long, env = "FAIL_MODE", value_enum, default_value_t = FailMode::Closed)]
    pub fail_mode: FailMode,

    // Expired counter sweep interval for the in-process store
    #[arg(long, env = "SWEEP_INTERVAL", default_value_t = 30)]
    pub sweep_interval: u64,
}

impl Args {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms.max(1))
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.client_cache_ttl),
            negative_ttl: Duration::from_secs(self.negative_cache_ttl),
            capacity: self.client_cache_capacity,
            lookup_timeout: self.call_timeout(),
        }
    }
}
