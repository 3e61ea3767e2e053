use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::clock::Clock;
use crate::directory::QuotaDirectory;
use crate::error::GateError;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE};
use crate::models::ClientQuota;

// Cache entry with timestamp
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub quota: ClientQuota,
    pub inserted_at_ms: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub ttl: Duration,
    // 0 disables negative caching
    pub negative_ttl: Duration,
    pub capacity: usize,
    pub lookup_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            negative_ttl: Duration::ZERO,
            capacity: 10_000,
            lookup_timeout: Duration::from_millis(250),
        }
    }
}

pub struct ClientConfigCache {
    directory: Arc<dyn QuotaDirectory>,
    clock: Arc<dyn Clock>,
    entries: DashMap<String, CacheEntry>,
    // client id -> when the directory last said "not found"
    unknown: DashMap<String, i64>,
    settings: CacheSettings,
}

fn is_fresh(inserted_at_ms: i64, now: i64, ttl: Duration) -> bool {
    now.saturating_sub(inserted_at_ms) < ttl.as_millis() as i64
}

impl ClientConfigCache {
    pub fn new(
        directory: Arc<dyn QuotaDirectory>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            directory,
            clock,
            entries: DashMap::new(),
            unknown: DashMap::new(),
            settings: CacheSettings {
                capacity: settings.capacity.max(1),
                ..settings
            },
        }
    }

    // Ok(None) for unknown clients. A directory failure serves an expired entry if one is held
    pub async fn get(&self, client_id: &str) -> Result<Option<ClientQuota>, GateError> {
        let now = self.clock.now_millis();

        let stale = match self.entries.get(client_id) {
            Some(entry) if is_fresh(entry.inserted_at_ms, now, self.settings.ttl) => {
                CACHE_HITS.inc();
                return Ok(Some(entry.quota.clone()));
            }
            Some(entry) => Some(entry.quota.clone()),
            None => None,
        };

        if stale.is_none() && self.known_unknown(client_id, now) {
            CACHE_HITS.inc();
            return Ok(None);
        }

        CACHE_MISSES.inc();

        let lookup = timeout(
            self.settings.lookup_timeout,
            self.directory.find_by_client_id(client_id),
        )
        .await;

        match lookup {
            Ok(Ok(Some(quota))) => {
                self.unknown.remove(client_id);
                self.insert(client_id, quota.clone(), now);
                Ok(Some(quota))
            }
            Ok(Ok(None)) => {
                self.entries.remove(client_id);
                CACHE_SIZE.set(self.entries.len() as f64);
                self.remember_unknown(client_id, now);
                Ok(None)
            }
            Ok(Err(e)) => self.fall_back(client_id, stale, e.to_string()),
            Err(_) => self.fall_back(
                client_id,
                stale,
                format!("lookup timed out after {:?}", self.settings.lookup_timeout),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fall_back(
        &self,
        client_id: &str,
        stale: Option<ClientQuota>,
        reason: String,
    ) -> Result<Option<ClientQuota>, GateError> {
        match stale {
            Some(quota) => {
                tracing::warn!(client_id, %reason, "Quota directory failed, serving expired cache entry");
                Ok(Some(quota))
            }
            None => Err(GateError::QuotaDirectoryUnavailable(reason)),
        }
    }

    fn known_unknown(&self, client_id: &str, now: i64) -> bool {
        if self.settings.negative_ttl.is_zero() {
            return false;
        }
        self.unknown
            .get(client_id)
            .is_some_and(|at| is_fresh(*at, now, self.settings.negative_ttl))
    }

    fn remember_unknown(&self, client_id: &str, now: i64) {
        if self.settings.negative_ttl.is_zero() {
            return;
        }
        if self.unknown.len() >= self.settings.capacity {
            let ttl = self.settings.negative_ttl;
            self.unknown.retain(|_, at| is_fresh(*at, now, ttl));
            if self.unknown.len() >= self.settings.capacity {
                return;
            }
        }
        self.unknown.insert(client_id.to_string(), now);
    }

    fn insert(&self, client_id: &str, quota: ClientQuota, now: i64) {
        if !self.entries.contains_key(client_id) && self.entries.len() >= self.settings.capacity {
            self.make_room(now);
        }

        self.entries.insert(
            client_id.to_string(),
            CacheEntry {
                quota,
                inserted_at_ms: now,
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    // Runs only when full. Expired entries go first, then the oldest tenth of the
    // capacity, so the next misses insert without another pass
    fn make_room(&self, now: i64) {
        let ttl = self.settings.ttl;
        self.entries
            .retain(|_, entry| is_fresh(entry.inserted_at_ms, now, ttl));

        let target = self.settings.capacity - self.settings.capacity.div_ceil(10);
        let excess = self.entries.len().saturating_sub(target);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(i64, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.inserted_at_ms, entry.key().clone()))
            .collect();
        if excess < by_age.len() {
            by_age.select_nth_unstable(excess);
        }
        for (_, key) in by_age.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::InMemoryQuotaDirectory;
    use crate::error::DirectoryError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // Directory double that counts lookups and can be switched off
    #[derive(Default)]
    struct ScriptedDirectory {
        inner: InMemoryQuotaDirectory,
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl QuotaDirectory for ScriptedDirectory {
        async fn find_by_client_id(
            &self,
            client_id: &str,
        ) -> Result<Option<ClientQuota>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(DirectoryError::Status(503));
            }
            self.inner.find_by_client_id(client_id).await
        }
    }

    fn settings() -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(60),
            negative_ttl: Duration::ZERO,
            capacity: 100,
            lookup_timeout: Duration::from_millis(200),
        }
    }

    fn cache_with(
        directory: Arc<ScriptedDirectory>,
        settings: CacheSettings,
    ) -> (ClientConfigCache, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let cache = ClientConfigCache::new(directory, Arc::new(clock.clone()), settings);
        (cache, clock)
    }

    fn directory_with(clients: &[(&str, u64, u64)]) -> Arc<ScriptedDirectory> {
        let directory = ScriptedDirectory::default();
        for (id, per_second, per_month) in clients {
            directory
                .inner
                .insert(ClientQuota::new(*id, *per_second, *per_month));
        }
        Arc::new(directory)
    }

    #[tokio::test]
    async fn hit_within_ttl_skips_directory() {
        let directory = directory_with(&[("acme", 5, 100)]);
        let (cache, clock) = cache_with(directory.clone(), settings());

        assert_eq!(
            cache.get("acme").await.unwrap(),
            Some(ClientQuota::new("acme", 5, 100))
        );
        clock.advance(Duration::from_secs(59));
        assert!(cache.get("acme").await.unwrap().is_some());

        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refreshed() {
        let directory = directory_with(&[("acme", 5, 100)]);
        let (cache, clock) = cache_with(directory.clone(), settings());

        cache.get("acme").await.unwrap();
        directory.inner.insert(ClientQuota::new("acme", 50, 1000));
        clock.advance(Duration::from_secs(60));

        assert_eq!(
            cache.get("acme").await.unwrap(),
            Some(ClientQuota::new("acme", 50, 1000))
        );
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_clients_are_not_cached_by_default() {
        let directory = directory_with(&[]);
        let (cache, _clock) = cache_with(directory.clone(), settings());

        assert_eq!(cache.get("ghost").await.unwrap(), None);
        directory.inner.insert(ClientQuota::new("ghost", 1, 1));

        assert!(cache.get("ghost").await.unwrap().is_some());
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn negative_entries_expire() {
        let directory = directory_with(&[]);
        let (cache, clock) = cache_with(
            directory.clone(),
            CacheSettings {
                negative_ttl: Duration::from_secs(5),
                ..settings()
            },
        );

        assert_eq!(cache.get("ghost").await.unwrap(), None);
        directory.inner.insert(ClientQuota::new("ghost", 1, 1));

        // still masked inside the negative ttl
        assert_eq!(cache.get("ghost").await.unwrap(), None);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(5));
        assert!(cache.get("ghost").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_entry() {
        let directory = directory_with(&[("a", 1, 1), ("b", 1, 1), ("c", 1, 1)]);
        let (cache, clock) = cache_with(
            directory.clone(),
            CacheSettings {
                capacity: 2,
                ..settings()
            },
        );

        cache.get("a").await.unwrap();
        clock.advance(Duration::from_millis(10));
        cache.get("b").await.unwrap();
        clock.advance(Duration::from_millis(10));
        cache.get("c").await.unwrap();

        assert_eq!(cache.len(), 2);
        // "a" went out, "b" is still cached
        cache.get("b").await.unwrap();
        assert_eq!(directory.calls.load(Ordering::SeqCst), 3);
        cache.get("a").await.unwrap();
        assert_eq!(directory.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn directory_failure_without_entry_is_a_fault() {
        let directory = directory_with(&[("acme", 5, 100)]);
        directory.failing.store(true, Ordering::SeqCst);
        let (cache, _clock) = cache_with(directory, settings());

        assert!(matches!(
            cache.get("acme").await,
            Err(GateError::QuotaDirectoryUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn directory_failure_serves_expired_entry() {
        let directory = directory_with(&[("acme", 5, 100)]);
        let (cache, clock) = cache_with(directory.clone(), settings());

        cache.get("acme").await.unwrap();
        clock.advance(Duration::from_secs(120));
        directory.failing.store(true, Ordering::SeqCst);

        assert_eq!(
            cache.get("acme").await.unwrap(),
            Some(ClientQuota::new("acme", 5, 100))
        );
    }

    #[tokio::test]
    async fn slow_directory_times_out() {
        let directory = Arc::new(ScriptedDirectory {
            delay: Some(Duration::from_millis(500)),
            ..ScriptedDirectory::default()
        });
        let (cache, _clock) = cache_with(
            directory,
            CacheSettings {
                lookup_timeout: Duration::from_millis(20),
                ..settings()
            },
        );

        let result = cache.get("acme").await;
        assert!(matches!(result, Err(GateError::QuotaDirectoryUnavailable(reason)) if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn full_cache_evicts_a_batch() {
        let ids: Vec<String> = (0..22).map(|i| format!("client-{i}")).collect();
        let directory = Arc::new(ScriptedDirectory::default());
        for id in &ids {
            directory.inner.insert(ClientQuota::new(id.as_str(), 1, 1));
        }
        let (cache, clock) = cache_with(
            directory.clone(),
            CacheSettings {
                capacity: 20,
                ..settings()
            },
        );

        for id in &ids[..20] {
            cache.get(id).await.unwrap();
            clock.advance(Duration::from_millis(1));
        }
        assert_eq!(cache.len(), 20);

        // one pass drops the two oldest, the next miss fits without evicting
        cache.get(&ids[20]).await.unwrap();
        assert_eq!(cache.len(), 19);
        cache.get(&ids[21]).await.unwrap();
        assert_eq!(cache.len(), 20);

        cache.get(&ids[2]).await.unwrap();
        assert_eq!(directory.calls.load(Ordering::SeqCst), 22);
        cache.get(&ids[0]).await.unwrap();
        assert_eq!(directory.calls.load(Ordering::SeqCst), 23);
    }
}
