use std::sync::Arc;

use crate::cache::{BoundedCache, CacheValue};

/// Fixed-size stand-in for an index artifact.
#[derive(Debug)]
pub struct Blob {
    pub bytes: usize,
}

impl CacheValue for Blob {
    fn size_in_bytes(&self) -> usize {
        self.bytes
    }
}

pub fn blob(bytes: usize) -> Arc<Blob> {
    Arc::new(Blob { bytes })
}

/// Cache of `capacity` bytes with the watermark disabled.
pub fn capacity_cache(capacity: usize) -> BoundedCache<Blob> {
    BoundedCache::new(capacity, 0.0)
}
