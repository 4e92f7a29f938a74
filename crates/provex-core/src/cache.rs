//! In-memory, single-flight cache for raw provider payloads.
//!
//! Entries are keyed by `(provider, command, request fingerprint)`. When
//! several callers miss on the same key at once, only the first performs the
//! fetch; the rest wait on a per-key lock and then read the fresh entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

/// Defines the behavior of the in-memory cache for a command call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Read a non-expired entry if present; otherwise fetch and store. (Default)
    #[default]
    Use,
    /// Always fetch, then overwrite the cached entry.
    Refresh,
    /// Always fetch; neither read nor write the cache.
    Bypass,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
}

impl CacheInner {
    fn get(&self, key: &str) -> Option<String> {
        self.map
            .get(key)
            .filter(|entry| Instant::now() <= entry.expires_at)
            .map(|entry| entry.body.clone())
    }

    /// Insert an entry, sweeping expired ones first so the map stays bounded
    /// by the live working set.
    fn put(&mut self, key: String, body: String, ttl: Duration) {
        self.clear_expired();
        let expires_at = Instant::now() + ttl;
        self.map.insert(key, CacheEntry { body, expires_at });
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.expires_at > now);
    }
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Per-key lock held for one fetch. Releases its map slot on drop, including
/// when the fetching future is cancelled.
struct InFlight<'a> {
    store: &'a CacheStore,
    key: &'a str,
    lock: KeyLock,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.store.release_key(self.key, &self.lock);
    }
}

/// A body produced by [`CacheStore::get_or_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached {
    pub body: String,
    /// True when the body came from the cache rather than a fetch by this caller.
    pub hit: bool,
}

/// Thread-safe in-memory cache for provider responses.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
    in_flight: Arc<Mutex<HashMap<String, KeyLock>>>,
    default_ttl: Duration,
}

impl CacheStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner::default())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            default_ttl,
        }
    }

    /// Create a cache store with a default TTL of 5 minutes.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300))
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_disabled(&self) -> bool {
        self.default_ttl == Duration::ZERO
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Build the canonical key for a provider request.
    pub fn key(provider: &str, command: &str, fingerprint: &str) -> String {
        format!("{provider}|{command}|{fingerprint}")
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.read().await.get(key)
    }

    /// Store `body` under `key`. A no-op when the cache is disabled or the
    /// effective TTL is zero.
    pub async fn put(&self, key: String, body: String, ttl_override: Option<Duration>) {
        if self.is_disabled() {
            return;
        }
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return;
        }
        self.inner.write().await.put(key, body, ttl);
    }

    pub async fn clear_expired(&self) {
        self.inner.write().await.clear_expired();
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn key_lock(&self, key: &str) -> KeyLock {
        let mut locks = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(key.to_owned()).or_default().clone()
    }

    fn release_key(&self, key: &str, lock: &KeyLock) {
        let mut locks = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // One reference lives in the map and one is ours; anything more is a waiter.
        if Arc::strong_count(lock) <= 2 {
            locks.remove(key);
        }
    }

    /// Return the cached body for `key`, or run `fetch` exactly once across
    /// concurrent callers and store its result. Errors are never cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        mode: CacheMode,
        fetch: F,
    ) -> Result<Cached, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if mode == CacheMode::Bypass || self.is_disabled() {
            return fetch().await.map(|body| Cached { body, hit: false });
        }

        if mode == CacheMode::Use {
            if let Some(body) = self.get(key).await {
                debug!(key, "cache hit");
                return Ok(Cached { body, hit: true });
            }
        }

        let flight = InFlight {
            store: self,
            key,
            lock: self.key_lock(key),
        };
        let _guard = flight.lock.lock().await;
        let cached = match mode {
            CacheMode::Use => self.get(key).await,
            _ => None,
        };
        match cached {
            Some(body) => {
                debug!(key, "cache filled by concurrent caller");
                Ok(Cached { body, hit: true })
            }
            None => {
                let body = fetch().await?;
                self.put(key.to_owned(), body.clone(), ttl).await;
                Ok(Cached { body, hit: false })
            }
        }
    }

    #[cfg(test)]
    fn in_flight_keys(&self) -> usize {
        self.in_flight.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
