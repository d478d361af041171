use std::sync::Arc;

use crate::cache::CacheValue;
use crate::config::ConfigService;
use crate::device::DeviceCacheManager;

/// Stand-in for a device-resident index shard.
#[derive(Debug)]
pub struct Shard {
    pub bytes: usize,
}

impl CacheValue for Shard {
    fn size_in_bytes(&self) -> usize {
        self.bytes
    }
}

pub fn shard(bytes: usize) -> Arc<dyn CacheValue> {
    Arc::new(Shard { bytes })
}

/// Manager over a fresh config service carrying the defaults.
pub fn manager() -> (Arc<ConfigService>, DeviceCacheManager) {
    let config = Arc::new(ConfigService::new());
    let manager = DeviceCacheManager::new(Arc::clone(&config));
    (config, manager)
}
