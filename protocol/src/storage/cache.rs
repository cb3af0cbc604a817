//! # Bounded TTL Caches
//!
//! One cache implementation, four instantiations (primary, transaction,
//! block, validator metrics — see the storage module docs). Semantics:
//!
//! - **TTL per entry**, refreshed on every read hit. An entry that keeps
//!   getting read stays hot forever; an entry nobody reads ages out.
//! - **LRU eviction with priority tiers.** When full, the least-recently
//!   used entry of the *lowest* tier goes first; PoW-critical entries
//!   (tier 2) outlive bookkeeping entries (tier 1) under pressure.
//! - **Optional evict hook**, so the primary cache can write dirty
//!   entries back to the store before dropping them.
//!
//! The cache never answers with an expired value, and eviction is a
//! performance event, not a correctness event — the store underneath is
//! always authoritative.

use std::hash::Hash;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

/// Default priority tier.
pub const PRIORITY_DEFAULT: u8 = 1;

/// Priority tier for PoW-critical entries (blocks, difficulty records).
pub const PRIORITY_POW: u8 = 2;

struct Entry<V> {
    value: V,
    expires_at: Instant,
    priority: u8,
}

type EvictHook<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

/// A bounded cache with per-entry TTL and tiered LRU eviction.
pub struct TtlCache<K: Hash + Eq + Clone, V: Clone> {
    inner: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
    capacity: usize,
    on_evict: Option<EvictHook<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache holding at most `capacity` entries, each living
    /// `ttl` past its last hit.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::unbounded()),
            ttl,
            capacity: capacity.max(1),
            on_evict: None,
        }
    }

    /// Attach a hook invoked for every entry evicted by capacity pressure
    /// (not for TTL expiry or explicit invalidation).
    pub fn with_evict_hook(mut self, hook: EvictHook<K, V>) -> Self {
        self.on_evict = Some(hook);
        self
    }

    /// Fetch a value. A hit refreshes both the TTL and the LRU position;
    /// an expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + self.ttl;
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.pop(key);
                None
            }
            None => None,
        }
    }

    /// Insert at the default priority tier.
    pub fn put(&self, key: K, value: V) {
        self.put_with_priority(key, value, PRIORITY_DEFAULT);
    }

    /// Insert at an explicit priority tier, evicting if at capacity.
    pub fn put_with_priority(&self, key: K, value: V, priority: u8) {
        let mut inner = self.inner.lock();
        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
            priority,
        };
        let replacing = inner.contains(&key);
        if !replacing && inner.len() >= self.capacity {
            self.evict_one(&mut inner);
        }
        inner.put(key, entry);
    }

    /// Drop an entry without firing the evict hook.
    pub fn invalidate(&self, key: &K) {
        self.inner.lock().pop(key);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Current entry count (expired entries included until touched).
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict the LRU entry of the lowest priority tier present. `iter()`
    /// walks most-recent-first, so the last match in iteration order is
    /// the least recently used within its tier.
    fn evict_one(&self, inner: &mut LruCache<K, Entry<V>>) {
        let lowest = inner
            .iter()
            .map(|(_, e)| e.priority)
            .min()
            .unwrap_or(PRIORITY_DEFAULT);
        let victim = inner
            .iter()
            .filter(|(_, e)| e.priority == lowest)
            .last()
            .map(|(k, _)| k.clone());
        if let Some(key) = victim {
            if let Some(entry) = inner.pop(&key) {
                if let Some(hook) = &self.on_evict {
                    hook(&key, &entry.value);
                }
            }
        }
    }
}
