//! Keyed result cache with staleness and retention horizons
//!
//! Entries move absent -> pending -> fresh -> stale -> evicted. A stale
//! entry is still served immediately; past the retention horizon it is
//! gone and the next read fetches synchronously. At most one fetch is
//! ever in flight per key - concurrent callers share its outcome.
//! Failures are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::gateway::GatewayError;

/// Ceiling on the delay between retry attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

/// Per-operation cache behaviour.
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Age after which the entry is still served but due for refresh.
    pub stale_after: Duration,
    /// Age after which the entry is evicted outright.
    pub retain_for: Duration,
    /// Automatic retries after a failed fetch.
    pub retries: u32,
    /// First retry delay; doubles per attempt, capped.
    pub base_delay: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(5 * 60),
            retain_for: Duration::from_secs(30 * 60),
            retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl CacheOptions {
    /// Write-style operations get a single retry.
    pub fn for_mutation() -> Self {
        Self {
            retries: 1,
            ..Self::default()
        }
    }

    /// Rarely-changing reference content tolerates much longer horizons.
    pub fn for_reference() -> Self {
        Self {
            stale_after: Duration::from_secs(60 * 60),
            retain_for: Duration::from_secs(2 * 60 * 60),
            ..Self::default()
        }
    }
}

/// Observable lifecycle of a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    Pending,
    Fresh,
    Stale,
}

struct CacheEntry {
    value: String,
    stored_at: Instant,
    stale_after: Duration,
    retain_for: Duration,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.stored_at)
    }

    fn is_stale(&self, now: Instant) -> bool {
        self.age(now) >= self.stale_after
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.age(now) >= self.retain_for
    }
}

type FetchOutcome = Result<String, GatewayError>;
type PendingRx = watch::Receiver<Option<FetchOutcome>>;

/// Deduplicating result cache for gateway calls.
pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    pending: Mutex<HashMap<String, PendingRx>>,
}

// a poisoned lock still holds usable map state
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Role {
    Leader(watch::Sender<Option<FetchOutcome>>),
    Waiter(PendingRx),
}

/// Removes the in-flight marker even when the leader is cancelled
/// mid-fetch, so a waiter can take over.
struct PendingGuard<'a> {
    cache: &'a QueryCache,
    key: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.cache.pending).remove(self.key);
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Serve the key from cache, or run `fetch` (coalesced per key, with
    /// retries) and cache the success.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, options: CacheOptions, fetch: F) -> FetchOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        self.run(key, options, fetch, true).await
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch) but never serves the
    /// cached value; the fetched result replaces it.
    pub async fn refresh<F, Fut>(&self, key: &str, options: CacheOptions, fetch: F) -> FetchOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        self.run(key, options, fetch, false).await
    }

    async fn run<F, Fut>(
        &self,
        key: &str,
        options: CacheOptions,
        fetch: F,
        serve_cached: bool,
    ) -> FetchOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        loop {
            if serve_cached {
                if let Some(value) = self.lookup(key) {
                    return Ok(value);
                }
            }

            let role = {
                let mut pending = lock(&self.pending);
                match pending.get(key) {
                    Some(rx) => Role::Waiter(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        pending.insert(key.to_string(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Waiter(mut rx) => {
                    if let Ok(outcome) = rx.wait_for(|outcome| outcome.is_some()).await {
                        if let Some(shared) = outcome.as_ref() {
                            return shared.clone();
                        }
                    }
                    // leader went away without publishing; take over
                }
                Role::Leader(tx) => {
                    let guard = PendingGuard { cache: self, key };
                    let outcome = fetch_with_backoff(&options, &fetch).await;
                    if let Ok(value) = &outcome {
                        lock(&self.entries).insert(
                            key.to_string(),
                            CacheEntry {
                                value: value.clone(),
                                stored_at: Instant::now(),
                                stale_after: options.stale_after,
                                retain_for: options.retain_for,
                            },
                        );
                    }
                    drop(guard);
                    let _ = tx.send(Some(outcome.clone()));
                    return outcome;
                }
            }
        }
    }

    /// Manually place a value under a key (write-operation results go in
    /// under their derived read key).
    pub fn insert(&self, key: &str, value: String, options: CacheOptions) {
        lock(&self.entries).insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                stale_after: options.stale_after,
                retain_for: options.retain_for,
            },
        );
    }

    /// Whether the key currently holds a value, stale or not.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        lock(&self.entries)
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Where the key sits in its lifecycle.
    pub fn state(&self, key: &str) -> EntryState {
        let now = Instant::now();
        let entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {}
            Some(entry) if entry.is_stale(now) => return EntryState::Stale,
            Some(_) => return EntryState::Fresh,
            None => {}
        }
        drop(entries);
        if lock(&self.pending).contains_key(key) {
            EntryState::Pending
        } else {
            EntryState::Absent
        }
    }

    /// Warm a key in the background without blocking the caller. The
    /// spawned task's outcome is deliberately dropped; it still performs
    /// cache and coalescing bookkeeping.
    pub fn prefetch<F, Fut>(self: &Arc<Self>, key: String, options: CacheOptions, fetch: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if cache.state(&key) == EntryState::Fresh {
                return;
            }
            if let Err(err) = cache.refresh(&key, options, fetch).await {
                debug!("prefetch failed (key={key}): {err}");
            }
        })
    }

    /// Drop entries past their retention horizon.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        lock(&self.entries).retain(|_, entry| !entry.is_expired(now));
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `fetch`, retrying transient failures with a doubling, capped
/// delay. The final failure propagates; it is never cached.
pub(crate) async fn fetch_with_backoff<F, Fut>(options: &CacheOptions, fetch: &F) -> FetchOutcome
where
    F: Fn() -> Fut,
    Fut: Future<Output = FetchOutcome>,
{
    let mut delay = options.base_delay;
    let mut attempt = 0;
    loop {
        match fetch().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < options.retries && err.is_transient() => {
                attempt += 1;
                debug!("fetch failed (attempt={attempt}): {err}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
            Err(err) => {
                warn!("fetch failed permanently: {err}");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(
        counter: Arc<AtomicUsize>,
        value: &str,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = FetchOutcome> + Send>> {
        let value = value.to_string();
        move || {
            let counter = Arc::clone(&counter);
            let value = value.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            })
        }
    }

    fn failing_fetch(
        counter: Arc<AtomicUsize>,
        error: GatewayError,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = FetchOutcome> + Send>> {
        move || {
            let counter = Arc::clone(&counter);
            let error = error.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(error)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let slow_fetch = || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok("shared answer".to_string())
        };
        let counted = {
            let counter = Arc::clone(&counter);
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                slow_fetch()
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch("q:fever:en", CacheOptions::default(), &counted),
            cache.get_or_fetch("q:fever:en", CacheOptions::default(), &counted),
        );

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), "shared answer");
        assert_eq!(b.unwrap(), "shared answer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_versus_retention() {
        let cache = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(Arc::clone(&counter), "v1");
        let options = CacheOptions::default(); // stale 5m, retain 30m

        cache.get_or_fetch("k", options, &fetch).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state("k"), EntryState::Fresh);

        // t = 4m: fresh, served without refetch
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert_eq!(cache.get_or_fetch("k", options, &fetch).await.unwrap(), "v1");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // t = 6m: stale but still served
        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert_eq!(cache.state("k"), EntryState::Stale);
        assert_eq!(cache.get_or_fetch("k", options, &fetch).await.unwrap(), "v1");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // t = 31m: evicted, refetched synchronously
        tokio::time::advance(Duration::from_secs(25 * 60)).await;
        assert_eq!(cache.state("k"), EntryState::Absent);
        cache.get_or_fetch("k", options, &fetch).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried_then_propagated() {
        let cache = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let fetch = failing_fetch(
            Arc::clone(&counter),
            GatewayError::Network("timeout".to_string()),
        );

        let result = cache.get_or_fetch("k", CacheOptions::default(), &fetch).await;
        assert!(result.is_err());
        // 1 attempt + 2 retries
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        // failures are not cached
        assert!(!cache.contains("k"));
        let _ = cache.get_or_fetch("k", CacheOptions::default(), &fetch).await;
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_error_is_not_retried() {
        let cache = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let fetch = failing_fetch(
            Arc::clone(&counter),
            GatewayError::NotConfigured("missing API key".to_string()),
        );

        let result = cache.get_or_fetch("k", CacheOptions::default(), &fetch).await;
        assert!(matches!(result, Err(GatewayError::NotConfigured(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_options_retry_once() {
        let cache = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let fetch = failing_fetch(
            Arc::clone(&counter),
            GatewayError::Upstream("500".to_string()),
        );

        let _ = cache.refresh("k", CacheOptions::for_mutation(), &fetch).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_insert_and_presence() {
        let cache = QueryCache::new();
        cache.insert("derived", "stored result".to_string(), CacheOptions::default());

        assert!(cache.contains("derived"));
        assert_eq!(cache.state("derived"), EntryState::Fresh);

        // presence ignores staleness but not retention
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        assert!(cache.contains("derived"));
        tokio::time::advance(Duration::from_secs(21 * 60)).await;
        assert!(!cache.contains("derived"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_replaces_cached_value() {
        let cache = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("k", CacheOptions::default(), &counting_fetch(Arc::clone(&counter), "old"))
            .await
            .unwrap();
        cache
            .refresh("k", CacheOptions::default(), &counting_fetch(Arc::clone(&counter), "new"))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        let served = cache
            .get_or_fetch("k", CacheOptions::default(), &counting_fetch(Arc::clone(&counter), "unused"))
            .await
            .unwrap();
        assert_eq!(served, "new");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_warms_in_background() {
        let cache = Arc::new(QueryCache::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = cache.prefetch(
            "warm".to_string(),
            CacheOptions::default(),
            counting_fetch(Arc::clone(&counter), "warmed"),
        );
        handle.await.unwrap();

        let served = cache
            .get_or_fetch("warm", CacheOptions::default(), &counting_fetch(Arc::clone(&counter), "unused"))
            .await
            .unwrap();
        assert_eq!(served, "warmed");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_sweeps_only_old_entries() {
        let cache = QueryCache::new();
        cache.insert("old", "v".to_string(), CacheOptions::default());
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        cache.insert("young", "v".to_string(), CacheOptions::default());

        cache.purge_expired();

        assert!(!cache.contains("old"));
        assert!(cache.contains("young"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_shared_with_waiters() {
        let cache = QueryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions {
            retries: 0,
            ..CacheOptions::default()
        };

        let fetch = {
            let counter = Arc::clone(&counter);
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Err(GatewayError::Upstream("overloaded".to_string()))
                }
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch("k", options, &fetch),
            cache.get_or_fetch("k", options, &fetch),
        );

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(matches!(a, Err(GatewayError::Upstream(_))));
        assert!(matches!(b, Err(GatewayError::Upstream(_))));
    }
}
