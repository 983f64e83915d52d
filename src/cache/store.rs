//! Cache Store Module
//!
//! Read-through cache with per-entry TTL, optional stale-while-revalidate and
//! metrics on every call.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, Freshness, MetricsRecorder};
use crate::error::Result;

// == Cache Status ==
/// How a value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a fresh entry
    Hit,
    /// Fetched from upstream and stored
    Miss,
    /// Served from a stale entry while a background refresh runs
    Stale,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Stale => "STALE",
        }
    }
}

// == Cached ==
/// A value together with the entry metadata it was served from.
#[derive(Debug, Clone)]
pub struct Cached<V> {
    pub value: V,
    pub status: CacheStatus,
    /// Wall-clock insertion time of the entry
    pub created_at: DateTime<Utc>,
    /// Entry age when it was served
    pub age: Duration,
    pub ttl: Duration,
}

impl<V: Clone> Cached<V> {
    fn from_entry(entry: &CacheEntry<V>, status: CacheStatus) -> Self {
        Self {
            value: entry.value.clone(),
            status,
            created_at: entry.created_at,
            age: entry.age(),
            ttl: entry.ttl,
        }
    }
}

// == Read-Through Cache ==
/// Memoizes fetch results by key with a time-to-live.
///
/// Cloning is cheap: clones share entries, metrics and the shutdown token.
pub struct ReadThroughCache<V> {
    entries: Arc<RwLock<HashMap<String, CacheEntry<V>>>>,
    /// Keys with a background refresh in flight
    refreshing: Arc<Mutex<HashSet<String>>>,
    metrics: Arc<MetricsRecorder>,
    shutdown: CancellationToken,
}

impl<V> Clone for ReadThroughCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            refreshing: self.refreshing.clone(),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ReadThroughCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> ReadThroughCache<V> {
    // == Constructor ==
    /// Creates an empty cache with its own metrics recorder.
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(MetricsRecorder::new()))
    }

    /// Creates an empty cache reporting into a shared recorder.
    pub fn with_metrics(metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            refreshing: Arc::new(Mutex::new(HashSet::new())),
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    // == Get Or Fetch ==
    /// Returns the fresh entry for `key`, or runs `fetch` and stores its result.
    ///
    /// A failing fetch records an error metric and the error is returned;
    /// nothing is stored.
    ///
    /// # Arguments
    /// * `key` - Logical identity of the query
    /// * `ttl` - Freshness period for a newly stored value
    /// * `fetch` - Upstream call, only invoked on a miss
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key).filter(|entry| entry.is_fresh()) {
                self.metrics.record_hit(None);
                debug!(key, "cache hit");
                return Ok(Cached::from_entry(entry, CacheStatus::Hit));
            }
        }

        self.fetch_and_store(key, ttl, None, fetch).await
    }

    // == Get Or Fetch (Stale-While-Revalidate) ==
    /// Like [`ReadThroughCache::get_or_fetch`], but an entry older than `ttl`
    /// and younger than `stale_window` is returned immediately while `fetch`
    /// refreshes it in the background.
    ///
    /// At most one background refresh runs per key. Its failure is logged and
    /// counted, never returned.
    pub async fn get_or_fetch_swr<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        stale_window: Duration,
        fetch: F,
    ) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let stale = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) => match entry.freshness() {
                    Freshness::Fresh => {
                        self.metrics.record_hit(None);
                        debug!(key, "cache hit");
                        return Ok(Cached::from_entry(entry, CacheStatus::Hit));
                    }
                    Freshness::Stale => Some(Cached::from_entry(entry, CacheStatus::Stale)),
                    Freshness::Expired => None,
                },
                None => None,
            }
        };

        match stale {
            Some(cached) => {
                self.metrics.record_hit(None);
                debug!(key, age_secs = cached.age.as_secs(), "serving stale entry");
                self.spawn_refresh(key.to_string(), ttl, stale_window, fetch);
                Ok(cached)
            }
            None => self.fetch_and_store(key, ttl, Some(stale_window), fetch).await,
        }
    }

    // == Refresh ==
    /// Forces a fetch regardless of the current entry and replaces it.
    pub async fn refresh<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        self.fetch_and_store(key, ttl, None, fetch).await
    }

    // == Get ==
    /// Returns a fresh entry without fetching or recording metrics.
    pub async fn get(&self, key: &str) -> Option<Cached<V>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh())
            .map(|entry| Cached::from_entry(entry, CacheStatus::Hit))
    }

    // == Invalidate ==
    /// Drops the entry for `key`. Returns whether one existed.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    // == Purge Expired ==
    /// Removes entries that are past both their TTL and stale window.
    ///
    /// Returns the number of entries removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Number of background refreshes currently running.
    pub fn pending_refreshes(&self) -> usize {
        self.refreshing_set().len()
    }

    /// Stops every background refresh of this cache and its clones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // == Internals ==
    async fn fetch_and_store<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        stale_window: Option<Duration>,
        fetch: F,
    ) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let start = Instant::now();
        match fetch().await {
            Ok(value) => {
                let latency = elapsed_ms(start);
                self.metrics.record_miss(Some(latency));
                debug!(key, latency_ms = latency, "cache miss, stored fresh value");
                Ok(self.store(key.to_string(), value, ttl, stale_window).await)
            }
            Err(err) => {
                let latency = elapsed_ms(start);
                self.metrics.record_miss(None);
                self.metrics.record_error(Some(latency), &err.to_string());
                warn!(key, latency_ms = latency, error = %err, "cache fetch failed");
                Err(err)
            }
        }
    }

    async fn store(
        &self,
        key: String,
        value: V,
        ttl: Duration,
        stale_window: Option<Duration>,
    ) -> Cached<V> {
        let entry = CacheEntry::new(value, ttl, stale_window);
        let cached = Cached::from_entry(&entry, CacheStatus::Miss);
        self.entries.write().await.insert(key, entry);
        cached
    }

    fn spawn_refresh<F, Fut>(&self, key: String, ttl: Duration, stale_window: Duration, fetch: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if !self.refreshing_set().insert(key.clone()) {
            debug!(key = %key, "background refresh already running");
            return;
        }

        let cache = self.clone();
        tokio::spawn(async move {
            let _guard = RefreshGuard {
                refreshing: cache.refreshing.clone(),
                key: key.clone(),
            };

            tokio::select! {
                result = fetch() => match result {
                    Ok(value) => {
                        cache.store(key.clone(), value, ttl, Some(stale_window)).await;
                        debug!(key = %key, "background refresh stored");
                    }
                    Err(err) => {
                        cache.metrics.record_error(None, &err.to_string());
                        warn!(key = %key, error = %err, "background refresh failed");
                    }
                },
                _ = cache.shutdown.cancelled() => {
                    debug!(key = %key, "background refresh cancelled");
                }
            }
        });
    }

    fn refreshing_set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.refreshing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the in-flight marker when a refresh task ends, however it ends.
struct RefreshGuard {
    refreshing: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        let mut set = self
            .refreshing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.key);
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Collapses whitespace so formatting differences map to one cache key.
///
/// Whitespace inside quoted string literals is kept as is.
pub fn normalize_key(query: &str) -> String {
    let mut key = String::with_capacity(query.len());
    let mut chars = query.trim().chars();
    let mut in_string = false;
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if in_string {
            key.push(c);
            match c {
                '\\' => key.extend(chars.next()),
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            key.push(' ');
            pending_space = false;
        }
        in_string = c == '"';
        key.push(c);
    }
    key
}
