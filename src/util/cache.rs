/// Shared TTL key-value cache with atomic set-if-absent
///
/// Backs the dedup locks (`alert:lock:*`), wallet fingerprints
/// (`wallet:fingerprint:*`) and health counters (`stats:*`). Keys carry
/// a per-entry TTL and expire lazily on read plus on a periodic sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Outcome of a lock-key acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Caller owns the key until the TTL elapses
    Acquired,
    /// A sibling holds the key
    Held,
    /// The cache could not serve the request; callers fall back to
    /// their secondary safety net
    Unavailable,
}

pub struct SharedCache {
    entries: DashMap<String, CacheEntry>,
    counters: DashMap<String, i64>,
    /// Flipped when the backing store is considered unreachable
    degraded: AtomicBool,
}

impl SharedCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            counters: DashMap::new(),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::Relaxed);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Store a serializable value under `key` for `ttl`
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if self.is_degraded() {
            return;
        }
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }

    /// Fetch and deserialize a live value, evicting it if expired
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if self.is_degraded() {
            return None;
        }
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                return serde_json::from_value(entry.value.clone()).ok();
            }
            Some(_) => {}
            None => return None,
        }
        self.entries.remove(key);
        None
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Atomic create-if-absent used for distributed-style locks.
    /// The DashMap entry guard makes the check-and-insert atomic per key.
    pub fn try_lock(&self, key: &str, ttl: Duration) -> LockOutcome {
        if self.is_degraded() {
            return LockOutcome::Unavailable;
        }
        let now = Instant::now();
        let mut acquired = false;
        self.entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.is_expired(now) {
                    entry.value = serde_json::Value::Bool(true);
                    entry.expires_at = Some(now + ttl);
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                CacheEntry {
                    value: serde_json::Value::Bool(true),
                    expires_at: Some(now + ttl),
                }
            });
        if acquired {
            LockOutcome::Acquired
        } else {
            LockOutcome::Held
        }
    }

    /// Increment a health counter and return the new value
    pub fn incr(&self, key: &str) -> i64 {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn counter(&self, key: &str) -> i64 {
        self.counters.get(key).map(|v| *v).unwrap_or(0)
    }

    /// Drop every expired entry; returns the number evicted
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, "cache sweep evicted expired entries");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let cache = SharedCache::new();
        cache.set_json("k", &42u64, Duration::from_secs(60));
        assert_eq!(cache.get_json::<u64>("k"), Some(42));
        assert_eq!(cache.get_json::<u64>("missing"), None);
    }

    #[test]
    fn test_expiry() {
        let cache = SharedCache::new();
        cache.set_json("k", &1u64, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get_json::<u64>("k"), None);
        assert!(cache.is_empty()); // expired read evicts
    }

    #[test]
    fn test_try_lock_create_if_absent() {
        let cache = SharedCache::new();
        assert_eq!(
            cache.try_lock("alert:lock:w:m", Duration::from_secs(30)),
            LockOutcome::Acquired
        );
        assert_eq!(
            cache.try_lock("alert:lock:w:m", Duration::from_secs(30)),
            LockOutcome::Held
        );
    }

    #[test]
    fn test_try_lock_after_expiry() {
        let cache = SharedCache::new();
        assert_eq!(
            cache.try_lock("lock", Duration::from_millis(10)),
            LockOutcome::Acquired
        );
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(
            cache.try_lock("lock", Duration::from_secs(30)),
            LockOutcome::Acquired
        );
    }

    #[test]
    fn test_degraded_mode() {
        let cache = SharedCache::new();
        cache.set_degraded(true);
        assert_eq!(cache.try_lock("lock", Duration::from_secs(1)), LockOutcome::Unavailable);
        cache.set_json("k", &1u64, Duration::from_secs(1));
        assert_eq!(cache.get_json::<u64>("k"), None);
    }

    #[test]
    fn test_counters() {
        let cache = SharedCache::new();
        assert_eq!(cache.incr("stats:wallet:total"), 1);
        assert_eq!(cache.incr("stats:wallet:total"), 2);
        assert_eq!(cache.counter("stats:wallet:total"), 2);
        assert_eq!(cache.counter("stats:wallet:errors"), 0);
    }

    #[test]
    fn test_sweep() {
        let cache = SharedCache::new();
        cache.set_json("short", &1u64, Duration::from_millis(5));
        cache.set_json("long", &2u64, Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.get_json::<u64>("long"), Some(2));
    }
}
