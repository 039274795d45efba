//! Resolved data URIs keyed by protected path, with single-flight
//! coordination of the fetches that fill them.
//!
//! Per path the lifecycle is `Uncached -> InFlight -> Cached`. A failed fetch
//! returns the path to `Uncached` (nothing negative is remembered), and only
//! an explicit [`ResolutionCache::invalidate`] moves `Cached` back. There is
//! no size bound or eviction.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;

/// The pending result every concurrent caller for one path awaits.
pub type SharedResolution = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolutionStatsSnapshot {
    pub hits: u64,
    pub leaders: u64,
    pub waiters: u64,
    pub failures: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
pub struct ResolutionStats {
    hits: AtomicU64,
    leaders: AtomicU64,
    waiters: AtomicU64,
    failures: AtomicU64,
    invalidations: AtomicU64,
}

impl ResolutionStats {
    fn on_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn on_lead(&self) -> u64 {
        self.leaders.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn on_wait(&self) -> u64 {
        self.waiters.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn on_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn on_invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ResolutionStatsSnapshot {
        ResolutionStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            leaders: self.leaders.load(Ordering::Relaxed),
            waiters: self.waiters.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// One registered fetch. `id` tells a settling flight whether it is still
/// the current one for its path or was superseded by an invalidation.
#[derive(Clone)]
struct Flight {
    id: u64,
    shared: SharedResolution,
}

/// Process-wide resolution state. Create one at startup and share it as
/// `Arc<ResolutionCache>`; separate instances never see each other's entries.
#[derive(Default)]
pub struct ResolutionCache {
    resolved: DashMap<String, String>,
    in_flight: DashMap<String, Flight>,
    next_flight: AtomicU64,
    stats: ResolutionStats,
}

impl fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("resolved", &self.resolved.len())
            .field("in_flight", &self.in_flight.len())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.resolved.get(path).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, path: impl Into<String>, data_uri: impl Into<String>) {
        self.resolved.insert(path.into(), data_uri.into());
    }

    /// Drop the cached value for `path` and detach any fetch in flight for
    /// it, so the next resolution starts a new request. Callers already
    /// waiting on the detached fetch still receive its result, but it is
    /// never cached. Returns whether anything was dropped.
    pub fn invalidate(&self, path: &str) -> bool {
        // Slot first: a settling flight checks its slot before caching.
        let detached = self.in_flight.remove(path).is_some();
        let removed = self.resolved.remove(path).is_some();
        if removed || detached {
            self.stats.on_invalidate();
            log::debug!(
                "[ResolutionCache] invalidated {} (cached={}, in_flight={})",
                path,
                removed,
                detached
            );
        }
        removed || detached
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, path: &str) -> bool {
        self.in_flight.contains_key(path)
    }

    pub fn stats(&self) -> ResolutionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolve `path` through the cache with at most one active fetch.
    ///
    /// On a miss with nothing in flight, `fetch` is invoked once. Inside a
    /// tokio runtime its future is spawned and runs until it settles whether
    /// or not any caller is still waiting; outside one it is driven by the
    /// awaiting callers.
    pub async fn resolve_with<F, Fut>(
        self: &Arc<Self>,
        path: &str,
        fetch: F,
    ) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        if let Some(hit) = self.get(path) {
            self.stats.on_hit();
            return Some(hit);
        }

        let (shared, is_leader) = match self.in_flight.entry(path.to_string()) {
            Entry::Occupied(entry) => {
                let waiters = self.stats.on_wait();
                log::debug!(
                    "singleflight wait: path={}, waiters={}",
                    path,
                    waiters
                );
                (entry.get().shared.clone(), false)
            }
            Entry::Vacant(entry) => {
                // Success is cached before the slot is released, so a leader
                // that settled after our first lookup is visible here.
                if let Some(hit) = self.get(path) {
                    self.stats.on_hit();
                    return Some(hit);
                }
                let leaders = self.stats.on_lead();
                log::debug!(
                    "singleflight lead: path={}, leaders={}",
                    path,
                    leaders
                );
                let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let shared = self.lead(path.to_string(), id, fetch());
                entry.insert(Flight {
                    id,
                    shared: shared.clone(),
                });
                (shared, true)
            }
        };

        if is_leader {
            match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(shared.clone());
                }
                Err(_) => log::debug!(
                    "singleflight without runtime: path={} is driven by its callers",
                    path
                ),
            }
        }
        shared.await
    }

    fn lead<Fut>(
        self: &Arc<Self>,
        key: String,
        id: u64,
        work: Fut,
    ) -> SharedResolution
    where
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let cache = Arc::clone(self);
        async move {
            let result = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    log::error!("image resolution for {} panicked", key);
                    None
                });
            let current = cache.settle(&key, id, result.as_deref());
            log::debug!(
                "singleflight complete: path={}, resolved={}, current={}",
                key,
                result.is_some(),
                current
            );
            result
        }
        .boxed()
        .shared()
    }

    /// Cache a success only while flight `id` still owns the slot for `key`,
    /// then release the slot. Returns whether the flight was still current.
    fn settle(&self, key: &str, id: u64, data_uri: Option<&str>) -> bool {
        {
            // Held across the insert so an invalidation cannot slip between
            // the ownership check and the write.
            let slot = self.in_flight.get(key);
            let current = slot.as_ref().is_some_and(|flight| flight.id == id);
            match data_uri {
                Some(data_uri) if current => self.insert(key, data_uri),
                Some(_) => {}
                None => self.stats.on_failure(),
            }
            if !current {
                return false;
            }
        }
        self.in_flight.remove_if(key, |_, flight| flight.id == id);
        true
    }
}
