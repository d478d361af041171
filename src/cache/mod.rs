//! # Bounded Cache Module
//!
//! A byte-capacity LRU cache for heavyweight index artifacts, keyed by
//! opaque fingerprint strings. Equal fingerprints denote bit-identical
//! artifacts, so the cache never duplicates a resident object.
//!
//! ## Ownership
//!
//! Values are shared (`Arc`). Eviction drops only the cache's clone — a
//! reader that pinned a handle through [`BoundedCache::lookup`] keeps the
//! artifact alive until its own release, which matters when a single
//! artifact is hundreds of megabytes of device memory.
//!
//! ## Eviction
//!
//! Two constraints are restored after every mutating operation:
//!
//! - `usage_bytes ≤ capacity_bytes`
//! - at least `free_mem_percent` of the capacity stays free, i.e.
//!   `usage_bytes ≤ capacity_bytes · (1 − free_mem_percent)`
//!
//! Least-recently-used entries are dropped until both hold or the cache is
//! empty. A value larger than the whole capacity is rejected outright,
//! without disturbing resident entries.
//!
//! ## Concurrency
//!
//! A single mutex serializes all operations — lookups included, because a
//! recency touch is a write. The mutex is recovered on poisoning: a lookup
//! must never fail, and the accounting is re-derivable from the entries.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::{debug, trace, warn};

// ------------------------------------------------------------------------------------------------
// CacheValue
// ------------------------------------------------------------------------------------------------

/// Capability set required of cached artifacts.
///
/// Sizes must be stable for the lifetime of the value — mutation after
/// insertion is forbidden by contract. Release is `Drop`.
pub trait CacheValue: Send + Sync {
    /// Resident byte size of the artifact.
    fn size_in_bytes(&self) -> usize;
}

// ------------------------------------------------------------------------------------------------
// BoundedCache
// ------------------------------------------------------------------------------------------------

/// One resident entry: the shared value plus its size recorded at insert.
struct Slot<V: ?Sized> {
    value: Arc<V>,
    bytes: usize,
}

struct CacheInner<V: ?Sized> {
    /// Fingerprint → slot; iteration order is the recency order.
    entries: LruCache<String, Slot<V>>,

    /// Σ slot.bytes over `entries`.
    usage_bytes: usize,

    /// Hard byte ceiling.
    capacity_bytes: usize,

    /// Fraction of capacity kept free after eviction, in `[0, 1]`.
    free_mem_percent: f64,
}

impl<V: ?Sized> CacheInner<V> {
    /// Usage level eviction drives down to.
    fn eviction_target(&self) -> usize {
        (self.capacity_bytes as f64 * (1.0 - self.free_mem_percent)) as usize
    }

    fn evict_to_target(&mut self) {
        let target = self.eviction_target();
        while self.usage_bytes > target {
            match self.entries.pop_lru() {
                Some((key, slot)) => {
                    self.usage_bytes -= slot.bytes;
                    debug!(%key, bytes = slot.bytes, usage = self.usage_bytes, "entry evicted");
                }
                None => break,
            }
        }
    }
}

/// Capacity-bounded LRU cache over shared values.
pub struct BoundedCache<V: CacheValue + ?Sized> {
    inner: Mutex<CacheInner<V>>,
}

impl<V: CacheValue + ?Sized> BoundedCache<V> {
    /// Creates a cache with the given byte capacity and free-memory
    /// watermark (clamped into `[0, 1]`).
    pub fn new(capacity_bytes: usize, free_mem_percent: f64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                usage_bytes: 0,
                capacity_bytes,
                free_mem_percent: free_mem_percent.clamp(0.0, 1.0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value under `key`, refreshing its recency. `None` on
    /// miss.
    pub fn lookup(&self, key: &str) -> Option<Arc<V>> {
        let mut inner = self.lock();
        let hit = inner.entries.get(key).map(|slot| Arc::clone(&slot.value));
        trace!(%key, hit = hit.is_some(), "cache lookup");
        hit
    }

    /// Inserts or replaces the value under `key`, then evicts
    /// least-recently-used entries until capacity and watermark hold.
    ///
    /// A value whose own size exceeds the capacity is rejected without
    /// insertion or eviction.
    pub fn insert(&self, key: impl Into<String>, value: Arc<V>) {
        let key = key.into();
        let bytes = value.size_in_bytes();
        let mut inner = self.lock();

        if bytes > inner.capacity_bytes {
            warn!(
                %key,
                bytes,
                capacity = inner.capacity_bytes,
                "value exceeds cache capacity, not inserted"
            );
            return;
        }

        if let Some(old) = inner.entries.put(key, Slot { value, bytes }) {
            inner.usage_bytes -= old.bytes;
        }
        inner.usage_bytes += bytes;
        inner.evict_to_target();
    }

    /// Removes the entry under `key`, if present.
    pub fn erase(&self, key: &str) {
        let mut inner = self.lock();
        if let Some(slot) = inner.entries.pop(key) {
            inner.usage_bytes -= slot.bytes;
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.usage_bytes = 0;
    }

    /// Updates the watermark (clamped into `[0, 1]`), evicting
    /// synchronously if the new watermark is already breached.
    pub fn set_free_mem_percent(&self, percent: f64) {
        let mut inner = self.lock();
        inner.free_mem_percent = percent.clamp(0.0, 1.0);
        inner.evict_to_target();
    }

    /// Current resident bytes.
    pub fn usage_bytes(&self) -> usize {
        self.lock().usage_bytes
    }

    /// Configured byte ceiling.
    pub fn capacity_bytes(&self) -> usize {
        self.lock().capacity_bytes
    }

    /// Configured watermark.
    pub fn free_mem_percent(&self) -> f64 {
        self.lock().free_mem_percent
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True iff no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}
