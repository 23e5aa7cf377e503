//! Key-addressed async result cache.
//!
//! Identical keys share one in-flight load. Entries older than the caller's
//! staleness window are still returned immediately while a refresh runs in
//! the background. Loads run as spawned tasks, so a caller that stops waiting
//! never cancels the fetch other callers depend on.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use weatherdash_storage::Coordinates;

/// A load task ended without publishing a result (it panicked or the
/// runtime shut down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cache load ended without a result")]
pub struct LoadAbandoned;

/// Composite cache key, e.g. `weather:coords:41.8781:-87.6298:Chicago`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn with(mut self, part: impl Into<String>) -> Self {
        self.0.push(part.into());
        self
    }

    /// Append latitude and longitude as given.
    ///
    /// Callers round to their configured precision first; every distinct
    /// rounded point gets its own key whatever that precision is.
    pub fn with_coords(self, coords: Coordinates) -> Self {
        // `+ 0.0` folds -0.0 into 0.0
        self.with((coords.lat + 0.0).to_string())
            .with((coords.lon + 0.0).to_string())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(":"))
    }
}

type Shared<V, E> = watch::Receiver<Option<Result<V, E>>>;

struct InFlight<V, E> {
    id: u64,
    rx: Shared<V, E>,
}

struct Slot<V, E> {
    value: Option<V>,
    updated_at: Option<Instant>,
    invalidated: bool,
    in_flight: Option<InFlight<V, E>>,
}

impl<V, E> Default for Slot<V, E> {
    fn default() -> Self {
        Self {
            value: None,
            updated_at: None,
            invalidated: false,
            in_flight: None,
        }
    }
}

impl<V: Clone, E> Slot<V, E> {
    fn fresh_value(&self, stale_time: Duration) -> Option<V> {
        if self.invalidated {
            return None;
        }
        let updated_at = self.updated_at?;
        if updated_at.elapsed() < stale_time {
            self.value.clone()
        } else {
            None
        }
    }

    /// The in-flight load, unless its task died without publishing
    fn live_load(&self) -> Option<Shared<V, E>> {
        self.in_flight
            .as_ref()
            .filter(|load| load.rx.has_changed().is_ok())
            .map(|load| load.rx.clone())
    }
}

/// Async cache from `QueryKey` to `Result<V, E>`.
///
/// Only successful values are stored; a failed load leaves any previous
/// value in place, and a key whose first load fails keeps no entry.
pub struct QueryCache<V, E> {
    slots: Arc<Mutex<HashMap<QueryKey, Slot<V, E>>>>,
    next_load: Arc<AtomicU64>,
}

impl<V, E> Clone for QueryCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            next_load: Arc::clone(&self.next_load),
        }
    }
}

impl<V, E> Default for QueryCache<V, E> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_load: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl<V, E> QueryCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<LoadAbandoned> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, loading it if needed.
    ///
    /// - fresh value: returned, `loader` not called
    /// - stale value: returned, refresh started unless one is running
    /// - load in flight: its result is shared
    /// - nothing cached: `loader` runs and its result is cached
    pub async fn get<F, Fut>(&self, key: QueryKey, stale_time: Duration, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let rx = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.clone()).or_default();

            if let Some(value) = slot.fresh_value(stale_time) {
                return Ok(value);
            }

            if let Some(value) = slot.value.clone() {
                if slot.live_load().is_none() {
                    tracing::debug!("Refreshing stale {}", key);
                    self.start_load(slot, key, loader());
                }
                return Ok(value);
            }

            match slot.live_load() {
                Some(rx) => rx,
                None => self.start_load(slot, key, loader()),
            }
        };

        Self::wait(rx).await
    }

    /// Load `key` now regardless of freshness and wait for the result.
    ///
    /// Joins a load that is already running rather than starting another.
    pub async fn refetch<F, Fut>(&self, key: QueryKey, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let rx = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.clone()).or_default();
            match slot.live_load() {
                Some(rx) => rx,
                None => self.start_load(slot, key, loader()),
            }
        };

        Self::wait(rx).await
    }

    /// Mark every entry under `prefix` stale; values stay readable.
    ///
    /// Returns the number of entries marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut slots = self.slots.lock();
        let mut marked = 0;
        for (key, slot) in slots.iter_mut() {
            if key.starts_with(prefix) {
                slot.invalidated = true;
                marked += 1;
            }
        }
        marked
    }

    /// All cached values under `prefix`, ordered by key.
    pub fn scan(&self, prefix: &QueryKey) -> Vec<(QueryKey, V)> {
        let slots = self.slots.lock();
        let mut entries: Vec<(QueryKey, V)> = slots
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, slot)| slot.value.clone().map(|value| (key.clone(), value)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// The cached value, fresh or not, without loading.
    pub fn peek(&self, key: &QueryKey) -> Option<V> {
        self.slots.lock().get(key).and_then(|slot| slot.value.clone())
    }

    /// Store `value` as a fresh entry.
    pub fn set(&self, key: QueryKey, value: V) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key).or_default();
        slot.value = Some(value);
        slot.updated_at = Some(Instant::now());
        slot.invalidated = false;
    }

    /// Drop every entry under `prefix`.
    ///
    /// Loads already running for removed keys still answer their waiters but
    /// do not repopulate the cache.
    pub fn remove(&self, prefix: &QueryKey) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, _| !key.starts_with(prefix));
        before - slots.len()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.slots
            .lock()
            .get(key)
            .is_some_and(|slot| slot.live_load().is_some())
    }

    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start_load<Fut>(&self, slot: &mut Slot<V, E>, key: QueryKey, load: Fut) -> Shared<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let id = self.next_load.fetch_add(1, Ordering::Relaxed);
        slot.in_flight = Some(InFlight { id, rx: rx.clone() });

        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            let result = load.await;

            {
                let mut slots = slots.lock();
                let mut evict = false;
                // Skip slots removed or reloaded since this load started
                if let Some(slot) = slots.get_mut(&key) {
                    if slot.in_flight.as_ref().is_some_and(|load| load.id == id) {
                        slot.in_flight = None;
                        match &result {
                            Ok(value) => {
                                slot.value = Some(value.clone());
                                slot.updated_at = Some(Instant::now());
                                slot.invalidated = false;
                            }
                            Err(_) => {
                                tracing::debug!("Load failed for {}", key);
                                // Nothing to keep for a key that never loaded
                                evict = slot.value.is_none();
                            }
                        }
                    }
                }
                if evict {
                    slots.remove(&key);
                }
            }

            let _ = tx.send(Some(result));
        });

        rx
    }

    async fn wait(mut rx: Shared<V, E>) -> Result<V, E> {
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(result) = current {
                return result;
            }
            if rx.changed().await.is_err() {
                let last = rx.borrow().clone();
                return last.unwrap_or_else(|| Err(E::from(LoadAbandoned)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Failed,
        Abandoned,
    }

    impl From<LoadAbandoned> for TestError {
        fn from(_: LoadAbandoned) -> Self {
            TestError::Abandoned
        }
    }

    type Cache = QueryCache<u32, TestError>;

    const STALE: Duration = Duration::from_secs(120);

    fn key(parts: &[&str]) -> QueryKey {
        QueryKey::new(parts.iter().copied())
    }

    fn counting_loader(
        calls: &Arc<AtomicUsize>,
        value: u32,
        delay: Duration,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, TestError>> + Send>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            })
        }
    }

    /// Let spawned loads run to completion
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[test]
    fn test_key_prefix_and_display() {
        let k = QueryKey::new(["weather", "coords"]).with_coords(Coordinates::new(41.8781, -87.6298));
        assert_eq!(k.to_string(), "weather:coords:41.8781:-87.6298");
        assert!(k.starts_with(&key(&["weather"])));
        assert!(!k.starts_with(&key(&["alerts"])));
        assert!(!key(&["weather"]).starts_with(&k));
    }

    #[test]
    fn test_coordinate_keys_keep_full_precision() {
        let near = |lat| QueryKey::new(["alerts"]).with_coords(Coordinates::new(lat, -94.57861));
        assert_ne!(near(39.09971), near(39.09974));
        assert_eq!(near(39.09971).to_string(), "alerts:39.09971:-94.57861");
        assert_eq!(
            QueryKey::new(["reverse"]).with_coords(Coordinates::new(-0.0, 0.0)),
            QueryKey::new(["reverse"]).with_coords(Coordinates::new(0.0, -0.0)),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_share_one_load() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(50);

        let (a, b) = tokio::join!(
            cache.get(key(&["weather", "x"]), STALE, counting_loader(&calls, 7, delay)),
            cache.get(key(&["weather", "x"]), STALE, counting_loader(&calls, 8, delay)),
        );

        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_skips_loader() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get(key(&["k"]), STALE, counting_loader(&calls, 1, Duration::ZERO)).await.unwrap();
        let again = cache
            .get(key(&["k"]), STALE, counting_loader(&calls, 2, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(again, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_returned_while_refreshing() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key(&["weather", "kc"]);

        cache.get(k.clone(), STALE, counting_loader(&calls, 1, Duration::ZERO)).await.unwrap();
        tokio::time::advance(STALE + Duration::from_secs(1)).await;

        let stale = cache
            .get(k.clone(), STALE, counting_loader(&calls, 2, Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(stale, 1);
        assert!(cache.is_fetching(&k));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(!cache.is_fetching(&k));
        assert_eq!(cache.peek(&k), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_previous_value() {
        let cache = Cache::new();
        let k = key(&["k"]);
        cache.set(k.clone(), 5);

        let result = cache.refetch(k.clone(), || async { Err(TestError::Failed) }).await;
        assert_eq!(result, Err(TestError::Failed));
        assert_eq!(cache.peek(&k), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_not_cached() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key(&["k"]);

        let seen = Arc::clone(&calls);
        let first = cache
            .get(k.clone(), STALE, move || {
                seen.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Failed) }
            })
            .await;
        assert_eq!(first, Err(TestError::Failed));

        let second = cache.get(k, STALE, counting_loader(&calls, 3, Duration::ZERO)).await;
        assert_eq!(second, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_first_load_leaves_no_slot() {
        let cache = Cache::new();
        for term in ["pa", "par", "pari"] {
            let result = cache
                .get(key(&["geocode", term]), STALE, || async { Err(TestError::Failed) })
                .await;
            assert_eq!(result, Err(TestError::Failed));
        }
        assert!(cache.slots.lock().is_empty());

        // A value that already exists keeps its slot through a failed refresh
        let k = key(&["geocode", "paris"]);
        cache.set(k.clone(), 1);
        let _ = cache.refetch(k.clone(), || async { Err(TestError::Failed) }).await;
        assert_eq!(cache.slots.lock().len(), 1);
        assert_eq!(cache.peek(&k), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refresh_on_next_get() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key(&["weather", "a"]);

        cache.get(k.clone(), STALE, counting_loader(&calls, 1, Duration::ZERO)).await.unwrap();
        assert_eq!(cache.invalidate(&key(&["weather"])), 1);

        // Stale value is served while the reload runs
        let value = cache
            .get(k.clone(), STALE, counting_loader(&calls, 2, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(value, 1);
        settle().await;
        assert_eq!(cache.peek(&k), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_by_prefix() {
        let cache = Cache::new();
        cache.set(key(&["weather", "b"]), 2);
        cache.set(key(&["weather", "a"]), 1);
        cache.set(key(&["reverse", "a"]), 9);

        let found: Vec<u32> = cache.scan(&key(&["weather"])).into_iter().map(|(_, v)| v).collect();
        assert_eq!(found, vec![1, 2]);
        assert_eq!(cache.scan(&key(&[])).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_does_not_resurrect_from_running_load() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key(&["weather", "a"]);

        let pending = {
            let cache = cache.clone();
            let loader = counting_loader(&calls, 4, Duration::from_millis(10));
            let k = k.clone();
            tokio::spawn(async move { cache.get(k, STALE, loader).await })
        };
        settle().await;
        assert!(cache.is_fetching(&k));

        assert_eq!(cache.remove(&key(&["weather"])), 1);
        assert_eq!(pending.await.unwrap(), Ok(4));
        assert_eq!(cache.peek(&k), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_loader_reports_abandoned() {
        let cache = Cache::new();
        let k = key(&["k"]);

        let result = cache
            .get(k.clone(), STALE, || async {
                let result: Result<u32, TestError> = Err(TestError::Failed);
                if result.is_err() {
                    panic!("loader blew up");
                }
                result
            })
            .await;
        assert_eq!(result, Err(TestError::Abandoned));

        // A dead load does not block the next one
        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache.get(k, STALE, counting_loader(&calls, 6, Duration::ZERO)).await;
        assert_eq!(value, Ok(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let cache = Cache::new();
        cache.set(key(&["a"]), 1);
        cache.set(key(&["b"]), 2);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
