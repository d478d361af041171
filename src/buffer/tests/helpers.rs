use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

use crate::batch::{ElementKind, VectorBatch, VectorId};
use crate::buffer::{BufferManager, BufferOptions};
use crate::meta::{InMemoryMetaStore, TableSchema};
use crate::segment::{MemorySegmentWriter, SegmentError, SegmentWriter};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Meta store with float32 tables `T`, `U`, `V` of dimension 4.
pub fn meta_store() -> Arc<InMemoryMetaStore> {
    init_tracing();
    let meta = InMemoryMetaStore::new();
    for table_id in ["T", "U", "V"] {
        meta.create_table(TableSchema::new(table_id, 4, ElementKind::Float32))
            .unwrap();
    }
    Arc::new(meta)
}

/// Manager over a recording writer with the given budget.
pub fn manager_with_budget(
    insert_buffer_size: usize,
) -> (BufferManager, Arc<MemorySegmentWriter>) {
    let writer = Arc::new(MemorySegmentWriter::new());
    let manager = BufferManager::new(
        BufferOptions { insert_buffer_size },
        meta_store(),
        Arc::clone(&writer) as Arc<dyn SegmentWriter>,
    );
    (manager, writer)
}

/// Manager with a budget large enough that no implicit flush ever runs.
pub fn manager() -> (BufferManager, Arc<MemorySegmentWriter>) {
    manager_with_budget(64 * 1024 * 1024)
}

/// Dimension-4 float batch: 8 ids, 32 floats, 192 bytes.
pub fn batch_192(ids_from: i64) -> VectorBatch {
    let ids: Vec<i64> = (ids_from..ids_from + 8).collect();
    VectorBatch::float32(4, vec![0.5f32; 32], ids).unwrap()
}

/// Dimension-4 float batch with explicit ids.
pub fn batch_with_ids(ids: Vec<i64>) -> VectorBatch {
    let data = vec![0.25f32; ids.len() * 4];
    VectorBatch::float32(4, data, ids).unwrap()
}

/// Writer that fails while `broken` is set, then records normally.
pub struct RecoveringWriter {
    pub broken: AtomicBool,
    pub sink: MemorySegmentWriter,
}

impl RecoveringWriter {
    pub fn new_broken() -> Self {
        Self {
            broken: AtomicBool::new(true),
            sink: MemorySegmentWriter::new(),
        }
    }

    pub fn repair(&self) {
        self.broken.store(false, Ordering::SeqCst);
    }
}

impl SegmentWriter for RecoveringWriter {
    fn serialize(
        &self,
        table_id: &str,
        batches: &[VectorBatch],
        tombstones: &[VectorId],
        max_lsn: u64,
    ) -> Result<(), SegmentError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(SegmentError::Io(std::io::Error::other("segment store down")));
        }
        self.sink.serialize(table_id, batches, tombstones, max_lsn)
    }
}
