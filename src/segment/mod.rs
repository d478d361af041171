//! # Segment Writer Module
//!
//! The durable sink of the write path. A memtable drains into exactly one
//! [`SegmentWriter::serialize`] call; everything past that boundary —
//! file layout, index building, replication — belongs to the storage
//! backend, not to this crate.
//!
//! ## Contract
//!
//! - `serialize` must be **idempotent** for a given `(table_id, max_lsn)`
//!   pair. Crash recovery replays the write-ahead log up to the highest
//!   LSN carried by a durable segment and may re-drive the same flush.
//! - A returned error means no durable side effect is observable; the
//!   caller retains the memtable and will retry on a later flush.
//!
//! [`MemorySegmentWriter`] records serialized segments in memory. It backs
//! the test suites and is a usable sink for ephemeral deployments that
//! never persist.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::sync::Mutex;

use thiserror::Error;
use tracing::trace;

use crate::batch::{VectorBatch, VectorId};
use crate::error::ErrorCode;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by a [`SegmentWriter`].
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The backend failed to persist the segment.
    #[error("segment I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend rejected the segment contents.
    #[error("segment rejected: {0}")]
    Rejected(String),

    /// Invariant violation inside the backend.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SegmentError {
    /// Classification of this error into the public code space.
    pub fn code(&self) -> ErrorCode {
        match self {
            SegmentError::Io(_) => ErrorCode::IoError,
            SegmentError::Rejected(_) => ErrorCode::InvalidArgument,
            SegmentError::Internal(_) => ErrorCode::Internal,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// SegmentWriter Trait
// ------------------------------------------------------------------------------------------------

/// Out-of-core sink invoked when a memtable is flushed.
pub trait SegmentWriter: Send + Sync {
    /// Persists the batches and tombstones of one table as an immutable
    /// segment stamped with `max_lsn`.
    fn serialize(
        &self,
        table_id: &str,
        batches: &[VectorBatch],
        tombstones: &[VectorId],
        max_lsn: u64,
    ) -> Result<(), SegmentError>;
}

// ------------------------------------------------------------------------------------------------
// In-memory implementation
// ------------------------------------------------------------------------------------------------

/// One recorded `serialize` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub table_id: String,
    pub batches: Vec<VectorBatch>,
    pub tombstones: Vec<VectorId>,
    pub max_lsn: u64,
}

impl Segment {
    /// Total vector count across the segment's batches.
    pub fn vector_count(&self) -> usize {
        self.batches.iter().map(VectorBatch::count).sum()
    }
}

/// [`SegmentWriter`] that appends every segment to an in-memory log.
#[derive(Default)]
pub struct MemorySegmentWriter {
    segments: Mutex<Vec<Segment>>,
}

impl MemorySegmentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every segment recorded so far, in serialization order.
    pub fn segments(&self) -> Vec<Segment> {
        self.segments
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Segments recorded for one table, in serialization order.
    pub fn segments_for(&self, table_id: &str) -> Vec<Segment> {
        self.segments()
            .into_iter()
            .filter(|s| s.table_id == table_id)
            .collect()
    }
}

impl SegmentWriter for MemorySegmentWriter {
    fn serialize(
        &self,
        table_id: &str,
        batches: &[VectorBatch],
        tombstones: &[VectorId],
        max_lsn: u64,
    ) -> Result<(), SegmentError> {
        let mut segments = self
            .segments
            .lock()
            .map_err(|_| SegmentError::Internal("mutex poisoned".into()))?;

        // Idempotence: a replayed (table_id, max_lsn) flush is a no-op.
        if segments
            .iter()
            .any(|s| s.table_id == table_id && s.max_lsn == max_lsn)
        {
            trace!(%table_id, max_lsn, "segment replay ignored");
            return Ok(());
        }

        trace!(
            %table_id,
            max_lsn,
            batches = batches.len(),
            tombstones = tombstones.len(),
            "segment recorded"
        );
        segments.push(Segment {
            table_id: table_id.to_string(),
            batches: batches.to_vec(),
            tombstones: tombstones.to_vec(),
            max_lsn,
        });
        Ok(())
    }
}
