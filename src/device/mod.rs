//! # Device Cache Module
//!
//! Per-accelerator caches of materialized index shards. Each device id owns
//! one [`BoundedCache`] of `dyn CacheValue` artifacts, created lazily the
//! first time the query pipeline touches that device and reconfigured at
//! runtime through the configuration service.
//!
//! ## Lifecycle
//!
//! - [`DeviceCacheManager::device`] is a double-checked get-or-create: a
//!   read-locked probe first, then a write-locked second check and build.
//! - A new [`DeviceCache`] reads its capacity and watermark from the
//!   config service, mirrors the enable flag into an atomic, and registers
//!   a change callback under a unique identity.
//! - Dropping a `DeviceCache` cancels the callback. Cache contents are
//!   released when the last shared reference drops — in-flight readers
//!   keep their artifacts.
//!
//! ## Gating
//!
//! Inserts are dropped while the device is disabled; lookups always reach
//! the cache, because already-resident artifacts stay valid when new
//! inserts are switched off.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace, warn};

use crate::cache::{BoundedCache, CacheValue};
use crate::config::{
    ConfigError, ConfigService, KEY_GPU_ENABLE, SECTION_GPU_RESOURCE, parse_bool,
};

// ------------------------------------------------------------------------------------------------
// DeviceCache
// ------------------------------------------------------------------------------------------------

/// The cache of one accelerator device.
pub struct DeviceCache {
    device_id: u64,
    cache: BoundedCache<dyn CacheValue>,

    /// Mirror of `gpu.resource.enable`, kept current by a config callback.
    enabled: Arc<AtomicBool>,

    /// Identity under which the enable callback is registered.
    identity: String,

    config: Arc<ConfigService>,
}

impl DeviceCache {
    fn new(device_id: u64, config: Arc<ConfigService>) -> Result<Self, ConfigError> {
        let identity = config.generate_identity("device-cache");

        let enabled = Arc::new(AtomicBool::new(config.gpu_resource_enabled()?));
        let capacity = config.gpu_cache_capacity_bytes()? as usize;
        let threshold = config.gpu_cache_threshold()?;

        // The callback touches only the atomic: it runs on the publisher's
        // thread and must not take any cache or manager lock.
        let flag = Arc::clone(&enabled);
        config.register_callback(
            SECTION_GPU_RESOURCE,
            KEY_GPU_ENABLE,
            &identity,
            Box::new(move |value| {
                let parsed = parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
                    section: SECTION_GPU_RESOURCE.to_string(),
                    key: KEY_GPU_ENABLE.to_string(),
                    value: value.to_string(),
                })?;
                flag.store(parsed, Ordering::Release);
                Ok(())
            }),
        )?;

        debug!(
            device_id,
            capacity,
            threshold,
            enabled = enabled.load(Ordering::Acquire),
            "device cache created"
        );

        Ok(Self {
            device_id,
            cache: BoundedCache::new(capacity, threshold),
            enabled,
            identity,
            config,
        })
    }

    /// The accelerator this cache belongs to.
    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    /// Whether inserts are currently accepted.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Fetches the artifact under `key`, regardless of the enable flag.
    pub fn lookup(&self, key: &str) -> Option<Arc<dyn CacheValue>> {
        self.cache.lookup(key)
    }

    /// Caches an artifact under `key`. Dropped silently while the device
    /// is disabled.
    pub fn insert(&self, key: impl Into<String>, value: Arc<dyn CacheValue>) {
        if !self.is_enabled() {
            trace!(device_id = self.device_id, "insert dropped, device disabled");
            return;
        }
        self.cache.insert(key, value);
    }

    /// Removes the artifact under `key`, if resident.
    pub fn erase(&self, key: &str) {
        self.cache.erase(key);
    }

    /// Drops every resident artifact.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Updates the watermark, evicting synchronously if breached.
    pub fn set_free_mem_percent(&self, percent: f64) {
        self.cache.set_free_mem_percent(percent);
    }

    /// Resident bytes.
    pub fn usage_bytes(&self) -> usize {
        self.cache.usage_bytes()
    }

    /// Configured byte ceiling.
    pub fn capacity_bytes(&self) -> usize {
        self.cache.capacity_bytes()
    }

    /// Resident artifact count.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// True iff no artifacts are resident.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Drop for DeviceCache {
    fn drop(&mut self) {
        if let Err(e) =
            self.config
                .cancel_callback(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, &self.identity)
        {
            warn!(device_id = self.device_id, error = %e, "callback cancellation failed");
        }
    }
}

// ------------------------------------------------------------------------------------------------
// DeviceCacheManager
// ------------------------------------------------------------------------------------------------

/// Process-wide registry of per-device caches.
///
/// Constructed once and passed by reference to consumers; the map behind
/// it enforces at-most-once cache instantiation per device id.
pub struct DeviceCacheManager {
    config: Arc<ConfigService>,
    devices: RwLock<HashMap<u64, Arc<DeviceCache>>>,
}

impl DeviceCacheManager {
    /// Creates a manager bound to the given configuration service.
    pub fn new(config: Arc<ConfigService>) -> Self {
        Self {
            config,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cache of `device_id`, creating it on first use.
    ///
    /// Double-checked: the fast path takes only the read lock; a miss
    /// upgrades to the write lock and re-checks before building, so two
    /// racing callers observe the same instance.
    pub fn device(&self, device_id: u64) -> Result<Arc<DeviceCache>, ConfigError> {
        {
            let devices = self
                .devices
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(cache) = devices.get(&device_id) {
                return Ok(Arc::clone(cache));
            }
        }

        let mut devices = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cache) = devices.get(&device_id) {
            return Ok(Arc::clone(cache));
        }

        let cache = Arc::new(DeviceCache::new(device_id, Arc::clone(&self.config))?);
        devices.insert(device_id, Arc::clone(&cache));
        Ok(cache)
    }

    /// Number of instantiated device caches.
    pub fn device_count(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops every device cache, cancelling their config callbacks.
    ///
    /// Artifacts still pinned by readers survive until those handles drop.
    pub fn shutdown(&self) {
        let mut devices = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        debug!(devices = devices.len(), "device cache manager shutdown");
        devices.clear();
    }
}
