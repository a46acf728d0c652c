use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Minimum time between two opportunistic sweeps of expired entries.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_access: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    tick: u64,
    last_sweep: Instant,
    hits: u64,
    misses: u64,
    sets: u64,
    evictions: u64,
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Stored values.
    pub sets: u64,
    /// Entries removed because they expired or the cache was full.
    pub evictions: u64,
    /// `hits / (hits + misses)`, 0 before the first lookup.
    pub hit_rate: f64,
    /// Entries currently held (expired ones included until swept).
    pub size: usize,
}

/// Bounded key/value store whose entries expire after a fixed TTL.
///
/// Safe to share between concurrent runs; all operations take a short
/// internal lock and never fail. A zero TTL disables the cache.
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    sweep_interval: Duration,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `max_entries` values for `ttl` each.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
                last_sweep: Instant::now(),
                hits: 0,
                misses: 0,
                sets: 0,
                evictions: 0,
            }),
        }
    }

    /// Override how often expired entries are swept on access.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Whether caching is switched off (zero TTL).
    pub fn is_disabled(&self) -> bool {
        self.ttl.is_zero()
    }

    /// Return the cached value for `key` if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.maybe_sweep(&mut inner, now);

        if self.is_disabled() {
            inner.misses += 1;
            return None;
        }

        inner.tick += 1;
        let tick = inner.tick;
        let lookup = match inner.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_access = tick;
                Some(Some(entry.value.clone()))
            }
            Some(_) => Some(None),
            None => None,
        };

        match lookup {
            Some(Some(value)) => {
                inner.hits += 1;
                Some(value)
            }
            Some(None) => {
                inner.entries.remove(key);
                inner.evictions += 1;
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store `value` under `key` for one TTL, evicting the least recently
    /// used entry first when the cache is full.
    pub fn set(&self, key: K, value: V) {
        if self.is_disabled() {
            return;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.maybe_sweep(&mut inner, now);

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            Self::sweep(&mut inner, now);
            if inner.entries.len() >= self.max_entries {
                Self::evict_lru(&mut inner);
            }
        }

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
                last_access: tick,
            },
        );
        inner.sets += 1;
    }

    /// Drop a single entry.
    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Drop every entry; counters are kept.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Entries currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            sets: inner.sets,
            evictions: inner.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            size: inner.entries.len(),
        }
    }

    fn maybe_sweep(&self, inner: &mut Inner<K, V>, now: Instant) {
        if now.duration_since(inner.last_sweep) >= self.sweep_interval {
            Self::sweep(inner, now);
        }
    }

    fn sweep(inner: &mut Inner<K, V>, now: Instant) {
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.expires_at > now);
        inner.evictions += (before - inner.entries.len()) as u64;
        inner.last_sweep = now;
    }

    fn evict_lru(inner: &mut Inner<K, V>) {
        let oldest = inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            inner.entries.remove(&key);
            inner.evictions += 1;
        }
    }
}
