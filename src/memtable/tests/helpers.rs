use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing_subscriber::EnvFilter;

use crate::batch::{ElementKind, VectorBatch, VectorId};
use crate::meta::{InMemoryMetaStore, TableSchema};
use crate::segment::{SegmentError, SegmentWriter};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Meta store pre-loaded with a float32 table `"t"` of dimension 4.
pub fn meta_with_table() -> Arc<InMemoryMetaStore> {
    init_tracing();
    let meta = InMemoryMetaStore::new();
    meta.create_table(TableSchema::new("t", 4, ElementKind::Float32))
        .unwrap();
    Arc::new(meta)
}

/// Float32 batch of dimension 4 with the given ids.
pub fn float_batch(ids: Vec<i64>) -> VectorBatch {
    let data = vec![0.25f32; ids.len() * 4];
    VectorBatch::float32(4, data, ids).unwrap()
}

/// Writer that fails every call, counting attempts.
#[derive(Default)]
pub struct FailingWriter {
    pub attempts: AtomicUsize,
}

impl SegmentWriter for FailingWriter {
    fn serialize(
        &self,
        _table_id: &str,
        _batches: &[VectorBatch],
        _tombstones: &[VectorId],
        _max_lsn: u64,
    ) -> Result<(), SegmentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SegmentError::Io(std::io::Error::other("disk unavailable")))
    }
}
