//! In-memory weather cache used as a fallback when every provider fails.
//!
//! Entries expire `ttl` after they were written. [`Cache::get`] enforces
//! expiration on its own; the optional sweeper only keeps memory bounded.

use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::model::Weather;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Storage for the last successful result per city.
pub trait Cache: Send + Sync + Debug {
    /// Returns the cached value if one exists and has not expired.
    fn get(&self, city: &str) -> Option<Weather>;

    /// Inserts or replaces the value for `city`, restarting its expiration.
    fn put(&self, city: &str, weather: Weather);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    weather: Weather,
    /// `None` when `now + ttl` is past the clock's range: the entry never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// Concurrent TTL cache keyed by the city string exactly as given.
#[derive(Debug)]
pub struct TtlCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    /// Starts a background task that purges expired entries every `ttl / 2`
    /// (at least once a day).
    ///
    /// The task only holds a weak reference and stops once the cache is dropped.
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let period = (self.ttl / 2).clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        let cache = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick resolves immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    tracing::debug!("weather cache dropped; sweeper exiting");
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.len(), "evicted expired cache entries");
                }
            }
        })
    }
}

impl Cache for TtlCache {
    fn get(&self, city: &str) -> Option<Weather> {
        let now = Instant::now();
        let found = self
            .entries
            .get(city)
            .and_then(|entry| entry.is_live(now).then_some(entry.weather));

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(city, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(city, "cache miss");
        }
        found
    }

    fn put(&self, city: &str, weather: Weather) {
        let entry = Entry { weather, expires_at: Instant::now().checked_add(self.ttl) };
        self.entries.insert(city.to_owned(), entry);
    }
}
