//! # Memtable Module
//!
//! ## Design Invariants
//!
//! - A memtable buffers writes for exactly one table, in arrival order.
//! - Byte footprint always equals the sum of buffered batch bytes plus
//!   8 bytes per tombstone.
//! - The LSN is monotonically non-decreasing across `set_lsn` calls.
//! - Once `serialize` succeeds the memtable is **terminal**: every further
//!   mutation is rejected.
//!
//! ## Flush Semantics
//!
//! - `serialize` drains the buffered batches and tombstones into a single
//!   [`SegmentWriter::serialize`] call stamped with the caller's `max_lsn`.
//! - On writer failure the memtable is left exactly as it was — contents
//!   intact, not terminal — so the owner can requeue it and retry.
//! - An empty memtable serializes without touching the writer: no durable
//!   side effect, but the memtable still becomes terminal.
//!
//! ## Ownership
//!
//! The memtable is a plain mutable structure. Its owner (the buffer
//! manager) holds it behind the primary mutex and is the only mutator;
//! there is no interior locking here.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::batch::{ElementKind, ID_BYTES, VectorBatch, VectorId};
use crate::error::ErrorCode;
use crate::meta::{MetaError, MetaStore, TableSchema};
use crate::segment::{SegmentError, SegmentWriter};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by [`MemTable`] operations.
#[derive(Debug, Error)]
pub enum MemtableError {
    /// Schema lookup failed (unknown table, metadata backend fault).
    #[error("metadata error: {0}")]
    Meta(#[from] MetaError),

    /// The batch dimension does not match the table schema.
    #[error("dimension mismatch for table {table_id}: schema {expected}, batch {got}")]
    DimensionMismatch {
        table_id: String,
        expected: usize,
        got: usize,
    },

    /// The batch element kind does not match the table schema.
    #[error("element kind mismatch for table {table_id}: schema {expected:?}, batch {got:?}")]
    ElementKindMismatch {
        table_id: String,
        expected: ElementKind,
        got: ElementKind,
    },

    /// The segment writer failed; the memtable retains its contents.
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Mutation or re-serialization of a terminal memtable.
    #[error("memtable for table {0} is terminal")]
    Terminal(String),
}

impl MemtableError {
    /// Classification of this error into the public code space.
    pub fn code(&self) -> ErrorCode {
        match self {
            MemtableError::Meta(e) => e.code(),
            MemtableError::DimensionMismatch { .. } => ErrorCode::InvalidArgument,
            MemtableError::ElementKindMismatch { .. } => ErrorCode::InvalidArgument,
            MemtableError::Segment(e) => e.code(),
            MemtableError::Terminal(_) => ErrorCode::Internal,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// MemTable
// ------------------------------------------------------------------------------------------------

/// Per-table mutable write buffer.
///
/// Accumulates [`VectorBatch`]es and tombstones until the buffer manager
/// promotes it for serialization. Inserts and deletes are O(1) appends;
/// the only expensive operation is `serialize`, confined to the flush
/// path.
pub struct MemTable {
    /// The table this buffer belongs to.
    table_id: String,

    /// Metadata store consulted lazily for schema validation.
    meta: Arc<dyn MetaStore>,

    /// Schema resolved on the first `add`.
    schema: Option<TableSchema>,

    /// Buffered insert batches, arrival order.
    batches: Vec<VectorBatch>,

    /// Buffered delete markers, arrival order.
    tombstones: Vec<VectorId>,

    /// Byte footprint: batch bytes + 8 per tombstone.
    mem_bytes: usize,

    /// Highest LSN observed via `set_lsn`.
    lsn: u64,

    /// Set by a successful `serialize`; the memtable is then terminal.
    terminal: bool,
}

impl MemTable {
    /// Creates an empty memtable for `table_id`.
    ///
    /// The schema is not consulted here — creation happens on the write
    /// path under the manager's lock, and a table that only ever receives
    /// deletes never needs one.
    pub fn new(table_id: impl Into<String>, meta: Arc<dyn MetaStore>) -> Self {
        Self {
            table_id: table_id.into(),
            meta,
            schema: None,
            batches: Vec::new(),
            tombstones: Vec::new(),
            mem_bytes: 0,
            lsn: 0,
            terminal: false,
        }
    }

    /// The table this buffer belongs to.
    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Appends a batch after validating it against the table schema.
    ///
    /// The schema is fetched from the metadata store on the first add and
    /// cached for the memtable's lifetime. A failed add leaves the byte
    /// footprint and contents untouched.
    pub fn add(&mut self, batch: VectorBatch) -> Result<(), MemtableError> {
        if self.terminal {
            return Err(MemtableError::Terminal(self.table_id.clone()));
        }

        if self.schema.is_none() {
            self.schema = Some(self.meta.describe_table(&self.table_id)?);
        }
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| MetaError::Internal("schema vanished after resolve".into()))?;

        if batch.dimension() != schema.dimension {
            return Err(MemtableError::DimensionMismatch {
                table_id: self.table_id.clone(),
                expected: schema.dimension,
                got: batch.dimension(),
            });
        }
        if batch.kind() != schema.element {
            return Err(MemtableError::ElementKindMismatch {
                table_id: self.table_id.clone(),
                expected: schema.element,
                got: batch.kind(),
            });
        }

        trace!(
            table_id = %self.table_id,
            vectors = batch.count(),
            bytes = batch.size_in_bytes(),
            "batch buffered"
        );

        self.mem_bytes += batch.size_in_bytes();
        self.batches.push(batch);
        Ok(())
    }

    /// Appends a tombstone for `id`. Never consults buffered batches.
    pub fn delete(&mut self, id: VectorId) -> Result<(), MemtableError> {
        if self.terminal {
            return Err(MemtableError::Terminal(self.table_id.clone()));
        }
        self.tombstones.push(id);
        self.mem_bytes += ID_BYTES;
        Ok(())
    }

    /// Appends tombstones for every id in order.
    pub fn delete_many(&mut self, ids: &[VectorId]) -> Result<(), MemtableError> {
        if self.terminal {
            return Err(MemtableError::Terminal(self.table_id.clone()));
        }
        self.tombstones.extend_from_slice(ids);
        self.mem_bytes += ids.len() * ID_BYTES;
        Ok(())
    }

    /// Records `max(current, lsn)`.
    pub fn set_lsn(&mut self, lsn: u64) {
        if lsn > self.lsn {
            self.lsn = lsn;
        }
    }

    /// Highest LSN observed so far.
    pub fn lsn(&self) -> u64 {
        self.lsn
    }

    /// Current byte footprint.
    pub fn current_mem(&self) -> usize {
        self.mem_bytes
    }

    /// True iff no batches and no tombstones are buffered.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.tombstones.is_empty()
    }

    /// True once `serialize` has succeeded.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Commits the buffered contents to the segment writer under `max_lsn`
    /// and marks the memtable terminal.
    ///
    /// Atomic from the caller's perspective: either the writer acknowledged
    /// the segment, or the error is returned and the memtable is unchanged.
    /// An empty memtable skips the writer call entirely.
    pub fn serialize(
        &mut self,
        max_lsn: u64,
        writer: &dyn SegmentWriter,
    ) -> Result<(), MemtableError> {
        if self.terminal {
            return Err(MemtableError::Terminal(self.table_id.clone()));
        }

        if !self.is_empty() {
            writer.serialize(&self.table_id, &self.batches, &self.tombstones, max_lsn)?;
        }

        debug!(
            table_id = %self.table_id,
            max_lsn,
            batches = self.batches.len(),
            tombstones = self.tombstones.len(),
            bytes = self.mem_bytes,
            "memtable serialized"
        );

        self.terminal = true;
        self.batches.clear();
        self.tombstones.clear();
        self.mem_bytes = 0;
        Ok(())
    }
}
