//! Volatile tier: bounded in-process LRU with a fixed per-entry TTL.
//!
//! Expiry is lazy. An entry older than the TTL reads as absent and is
//! dropped at that moment. Capacity overflow evicts the least recently
//! used entry. Nothing survives a restart.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct VolatileCache<K, V> {
    inner: Mutex<LruCache<K, Entry<V>>>,
    capacity: NonZeroUsize,
    ttl: Duration,
}

impl<K, V> VolatileCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            capacity,
            ttl,
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock().await;
        let entry = cache.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            return Some(entry.value.clone());
        }
        cache.pop(key);
        None
    }

    pub async fn put(&self, key: K, value: V) {
        let entry = Entry {
            value,
            inserted_at: Instant::now(),
        };
        self.inner.lock().await.put(key, entry);
    }

    /// Number of resident entries, including expired ones not yet read.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry and return how many were held.
    pub async fn clear(&self) -> usize {
        let mut cache = self.inner.lock().await;
        let count = cache.len();
        cache.clear();
        count
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
