use crate::error::SessionResult;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Freshness window applied when the caller does not pass one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Key addressing one cached collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fetched value and the moment it was stored. Never partially updated.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub key: CacheKey,
    pub value: V,
    pub fetched_at: Instant,
    invalidated: bool,
}

impl<V> CacheEntry<V> {
    fn new(key: CacheKey, value: V, fetched_at: Instant) -> Self {
        Self {
            key,
            value,
            fetched_at,
            invalidated: false,
        }
    }

    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        !self.invalidated && now.saturating_duration_since(self.fetched_at) < ttl
    }
}

type SharedFetch<V> = Shared<BoxFuture<'static, SessionResult<V>>>;

struct InFlight<V> {
    id: u64,
    fetch: SharedFetch<V>,
}

struct Slot<V> {
    entry: Option<CacheEntry<V>>,
    in_flight: Option<InFlight<V>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            entry: None,
            in_flight: None,
        }
    }
}

/// TTL-keyed store for fetched collections with in-flight request coalescing.
///
/// Expired entries are inert: they are neither served as fresh nor purged, so a
/// caller can still fall back to them through [`CacheStore::peek_stale`].
pub struct CacheStore<V> {
    slots: DashMap<CacheKey, Slot<V>>,
    default_ttl: Duration,
    next_fetch: AtomicU64,
}

impl<V> Default for CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(default_ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            default_ttl,
            next_fetch: AtomicU64::new(1),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// [`CacheStore::get`] with the store's default TTL.
    pub async fn get_default<F, Fut>(&self, key: &CacheKey, fetcher: F) -> SessionResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SessionResult<V>> + Send + 'static,
    {
        self.get(key, self.default_ttl, fetcher).await
    }

    /// Returns the fresh value for `key`, or runs `fetcher` and stores its result.
    ///
    /// Callers arriving while a fetch for the same key is pending await that
    /// fetch instead of starting another one. `fetcher` is invoked while the
    /// key's shard is locked, so it must only build the future and never touch
    /// this store synchronously.
    pub async fn get<F, Fut>(&self, key: &CacheKey, ttl: Duration, fetcher: F) -> SessionResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SessionResult<V>> + Send + 'static,
    {
        let (id, fetch) = {
            let mut slot = self.slots.entry(key.clone()).or_default();
            if let Some(entry) = slot
                .entry
                .as_ref()
                .filter(|entry| entry.is_fresh(Instant::now(), ttl))
            {
                trace!(key = %key, "cache hit");
                return Ok(entry.value.clone());
            }

            let pending = slot
                .in_flight
                .as_ref()
                .map(|in_flight| (in_flight.id, in_flight.fetch.clone()));
            match pending {
                Some(joined) => {
                    debug!(key = %key, "joining in-flight fetch");
                    joined
                }
                None => {
                    let id = self.next_fetch.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, fetch_id = id, "cache miss, fetching");
                    let fetch = fetcher().boxed().shared();
                    slot.in_flight = Some(InFlight {
                        id,
                        fetch: fetch.clone(),
                    });
                    (id, fetch)
                }
            }
        };

        let result = fetch.await;
        self.commit(key, id, &result);
        result
    }

    /// Stores the outcome of fetch `id` unless it was detached by an invalidation
    /// or already committed by another waiter.
    fn commit(&self, key: &CacheKey, id: u64, result: &SessionResult<V>) {
        let Some(mut slot) = self.slots.get_mut(key) else {
            return;
        };
        if slot.in_flight.as_ref().map(|in_flight| in_flight.id) != Some(id) {
            return;
        }
        slot.in_flight = None;
        match result {
            Ok(value) => {
                slot.entry = Some(CacheEntry::new(key.clone(), value.clone(), Instant::now()));
            }
            Err(err) => {
                warn!(key = %key, error = %err, "fetch failed, previous entry kept");
            }
        }
    }

    /// Forcibly expires `key`. A pending fetch is detached so its result is
    /// delivered to its waiters but not stored. Returns whether anything was
    /// expired or detached.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let Some(mut slot) = self.slots.get_mut(key) else {
            return false;
        };
        let mut touched = false;
        if let Some(entry) = slot.entry.as_mut() {
            touched = !entry.invalidated;
            entry.invalidated = true;
        }
        if slot.in_flight.take().is_some() {
            touched = true;
        }
        debug!(key = %key, touched, "cache entry invalidated");
        touched
    }

    /// Last stored value for `key` regardless of age or invalidation.
    pub fn peek_stale(&self, key: &CacheKey) -> Option<V> {
        self.slots
            .get(key)
            .and_then(|slot| slot.entry.as_ref().map(|entry| entry.value.clone()))
    }

    /// Returns true when `key` would be served without a fetch under `ttl`.
    pub fn is_fresh(&self, key: &CacheKey, ttl: Duration) -> bool {
        let now = Instant::now();
        self.slots.get(key).is_some_and(|slot| {
            slot.entry
                .as_ref()
                .is_some_and(|entry| entry.is_fresh(now, ttl))
        })
    }

    /// Drops every entry and detaches pending fetches.
    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
