//! # vecstage
//!
//! The write-path and device-cache core of a vector-similarity database:
//! absorbs vector inserts and deletes at memory speed, promotes buffered
//! writes to immutable segments through an external segment writer, and —
//! on accelerator-equipped nodes — keeps a per-device, capacity-bounded
//! cache of materialized index artifacts.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     BufferManager                         │
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────┐   │
//! │  │  Mutable     │   │  Immutable   │   │ SegmentWriter │   │
//! │  │  MemTables   │   │  MemTables   │   │  (external)   │   │
//! │  │  per table   │   │  (promoted)  │   │               │   │
//! │  └──────┬───────┘   └──────┬───────┘   └───────▲───────┘   │
//! │         │  to_immutable    │   serialize       │           │
//! │         └──────────►       └──────────────────►│           │
//! └───────────────────────────────────────────────────────────┘
//!
//! ┌───────────────────────────────────────────────────────────┐
//! │                  DeviceCacheManager                       │
//! │   device 0 ─► BoundedCache   device 1 ─► BoundedCache     │
//! │        ▲ enable / capacity / watermark                    │
//! │        └────────── ConfigService callbacks                │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`batch`] | Immutable vector batches with tagged float32 / packed-byte payloads |
//! | [`buffer`] | Write routing, byte budget, flush orchestration |
//! | [`memtable`] | Per-table accumulator of batches and tombstones with LSN tracking |
//! | [`segment`] | Segment-writer interface and an in-memory recording sink |
//! | [`meta`] | Table schemas, partitions, and the metadata-store interface |
//! | [`cache`] | Byte-capacity LRU cache with a free-memory watermark |
//! | [`device`] | Per-device cache singletons wired to runtime configuration |
//! | [`config`] | Dynamic settings with typed getters and change callbacks |
//! | [`error`] | The stable error-code space surfaced across the API |
//!
//! ## Key Properties
//!
//! - **O(1) writes** — inserts and deletes append to a per-table memtable;
//!   the only expensive operation is segment serialization, confined to
//!   the flush path behind its own lock.
//! - **Bounded buffering** — a global byte budget over all memtables
//!   triggers an implicit full flush before it is breached further.
//! - **Crash-recoverable flushes** — every segment carries the highest
//!   log sequence number it contains; replay discards the WAL prefix a
//!   durable segment already covers.
//! - **No silent loss** — a memtable whose serialization fails is requeued
//!   and retried by the next flush.
//! - **Shared cache artifacts** — device-cache values are reference
//!   counted; eviction drops the cache's share while readers keep theirs.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use vecstage::batch::{ElementKind, VectorBatch};
//! use vecstage::buffer::{BufferManager, BufferOptions};
//! use vecstage::meta::{InMemoryMetaStore, TableSchema};
//! use vecstage::segment::MemorySegmentWriter;
//!
//! let meta = Arc::new(InMemoryMetaStore::new());
//! meta.create_table(TableSchema::new("embeddings", 4, ElementKind::Float32))
//!     .unwrap();
//! let writer = Arc::new(MemorySegmentWriter::new());
//!
//! let manager = BufferManager::new(
//!     BufferOptions::default(),
//!     Arc::clone(&meta),
//!     Arc::clone(&writer),
//! );
//!
//! // Stage a batch of two 4-dimensional vectors under LSN 1.
//! let batch = VectorBatch::float32(4, vec![0.1; 8], vec![1, 2]).unwrap();
//! manager.insert_vectors("embeddings", batch, 1).unwrap();
//!
//! // Deletes are tombstones; nothing is reconciled in memory.
//! manager.delete_vector("embeddings", 1, 2).unwrap();
//!
//! // Flush drains every non-empty memtable into one segment per table.
//! let flushed = manager.flush_all().unwrap();
//! assert!(flushed.contains("embeddings"));
//! assert_eq!(writer.segments_for("embeddings")[0].max_lsn, 2);
//! ```

pub mod batch;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod memtable;
pub mod meta;
pub mod segment;
