//! # Buffer Manager Module
//!
//! Routes client writes into per-table [`MemTable`]s, enforces the global
//! insert-buffer byte budget, and orchestrates flushes through the segment
//! writer.
//!
//! ## State Machine
//!
//! A memtable moves through `absent → mutable` (first write to its table),
//! `mutable → immutable` (promotion), `immutable → serialized` (flush),
//! and is destroyed after serialization or on [`BufferManager::erase_table`].
//! It lives in exactly one of the mutable map or the immutable list at any
//! time.
//!
//! ## Locking
//!
//! Two mutexes, always acquired in the same order:
//!
//! - the **primary** lock guards the mutable map and the immutable list;
//! - the **serialization** lock makes segment writing single-writer per
//!   process, bounding memory amplification during flush.
//!
//! A flush swaps the immutable list into a local under the primary lock,
//! releases it, and serializes holding only the serialization lock — insert
//! throughput on other tables is unaffected while segments are written.
//! Requeueing failed memtables re-acquires the primary lock only after the
//! serialization lock is released.
//!
//! ## Failure Semantics
//!
//! Add failures surface to the caller with the memtable consistent. A
//! memtable whose serialization fails is requeued onto the immutable list
//! and retried by the next flush; the first error of the pass is returned.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{error, info, trace};

use crate::batch::{VectorBatch, VectorId};
use crate::error::ErrorCode;
use crate::memtable::{MemTable, MemtableError};
use crate::meta::MetaStore;
use crate::segment::SegmentWriter;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by [`BufferManager`] operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The named table has no memtable to promote or erase.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Error from the underlying memtable (validation, metadata, segment
    /// writer).
    #[error("memtable error: {0}")]
    Memtable(#[from] MemtableError),

    /// Invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BufferError {
    /// Classification of this error into the public code space.
    pub fn code(&self) -> ErrorCode {
        match self {
            BufferError::TableNotFound(_) => ErrorCode::NotFound,
            BufferError::Memtable(e) => e.code(),
            BufferError::Internal(_) => ErrorCode::Internal,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// Tunables of the buffer manager.
#[derive(Debug, Clone)]
pub struct BufferOptions {
    /// Global byte ceiling over all buffered memtables (mutable and
    /// immutable). Exceeding it triggers an implicit full flush on the
    /// next insert.
    pub insert_buffer_size: usize,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            insert_buffer_size: 256 * 1024 * 1024,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// BufferManager
// ------------------------------------------------------------------------------------------------

struct BufferInner {
    /// Table id → mutable memtable accepting writes.
    mutable: HashMap<String, MemTable>,

    /// Memtables promoted out of the mutable map, awaiting serialization.
    immutable: Vec<MemTable>,
}

/// Write-path staging layer over all tables.
pub struct BufferManager {
    /// Primary lock: mutable map + immutable list.
    inner: Mutex<BufferInner>,

    /// Serialization lock: segment writing is single-writer per process.
    serialize_mtx: Mutex<()>,

    options: BufferOptions,
    meta: Arc<dyn MetaStore>,
    writer: Arc<dyn SegmentWriter>,
}

impl BufferManager {
    /// Creates a manager over the given metadata store and segment writer.
    pub fn new(
        options: BufferOptions,
        meta: Arc<dyn MetaStore>,
        writer: Arc<dyn SegmentWriter>,
    ) -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                mutable: HashMap::new(),
                immutable: Vec::new(),
            }),
            serialize_mtx: Mutex::new(()),
            options,
            meta,
            writer,
        }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, BufferInner>, BufferError> {
        self.inner
            .lock()
            .map_err(|_| BufferError::Internal("primary mutex poisoned".into()))
    }

    /// Get-or-create the mutable memtable of `table_id`. Caller holds the
    /// primary lock.
    fn memtable_entry<'a>(
        inner: &'a mut BufferInner,
        table_id: &str,
        meta: &Arc<dyn MetaStore>,
    ) -> &'a mut MemTable {
        inner
            .mutable
            .entry(table_id.to_string())
            .or_insert_with(|| MemTable::new(table_id, Arc::clone(meta)))
    }

    /// Highest LSN across every buffered memtable. Caller holds the
    /// primary lock. Used to stamp flushes so the segment carries the
    /// highest LSN committed at promotion time.
    fn flush_lsn_locked(inner: &BufferInner) -> u64 {
        let mutable_max = inner.mutable.values().map(MemTable::lsn).max().unwrap_or(0);
        let immutable_max = inner.immutable.iter().map(MemTable::lsn).max().unwrap_or(0);
        mutable_max.max(immutable_max)
    }

    // --------------------------------------------------------------------------------------------
    // Write path
    // --------------------------------------------------------------------------------------------

    /// Buffers a batch for `table_id` under `lsn`.
    ///
    /// When the global budget is already exceeded, a full flush runs first
    /// and the serialized table ids are returned. The budget check uses a
    /// snapshot of mutable plus immutable bytes, so the manager does not
    /// over-buffer while segment I/O lags.
    ///
    /// On an add failure after an implicit flush, the error wins and the
    /// flush report is not returned.
    pub fn insert_vectors(
        &self,
        table_id: &str,
        batch: VectorBatch,
        lsn: u64,
    ) -> Result<BTreeSet<String>, BufferError> {
        let mut flushed = BTreeSet::new();
        if self.current_mem()? > self.options.insert_buffer_size {
            flushed = self.flush_all()?;
        }

        let mut inner = self.lock_inner()?;
        let mem = Self::memtable_entry(&mut inner, table_id, &self.meta);
        mem.set_lsn(lsn);
        mem.add(batch)?;

        trace!(%table_id, lsn, bytes = mem.current_mem(), "batch staged");
        Ok(flushed)
    }

    /// Buffers a tombstone for one id.
    pub fn delete_vector(&self, table_id: &str, id: VectorId, lsn: u64) -> Result<(), BufferError> {
        let mut inner = self.lock_inner()?;
        let mem = Self::memtable_entry(&mut inner, table_id, &self.meta);
        mem.set_lsn(lsn);
        mem.delete(id)?;
        Ok(())
    }

    /// Buffers tombstones for every id, in order. Atomic: tombstone
    /// appends cannot fail on a live memtable, so the batch is applied
    /// entirely or not at all.
    pub fn delete_vectors(
        &self,
        table_id: &str,
        ids: &[VectorId],
        lsn: u64,
    ) -> Result<(), BufferError> {
        let mut inner = self.lock_inner()?;
        let mem = Self::memtable_entry(&mut inner, table_id, &self.meta);
        mem.set_lsn(lsn);
        mem.delete_many(ids)?;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Flush path
    // --------------------------------------------------------------------------------------------

    /// Promotes the named memtable onto the immutable list.
    ///
    /// Returns `TableNotFound` without side effect when the table has no
    /// mutable memtable.
    pub fn to_immutable(&self, table_id: &str) -> Result<(), BufferError> {
        let mut inner = self.lock_inner()?;
        let mem = inner
            .mutable
            .remove(table_id)
            .ok_or_else(|| BufferError::TableNotFound(table_id.to_string()))?;
        inner.immutable.push(mem);
        Ok(())
    }

    /// Flushes the named table: promotes its memtable, then drains and
    /// serializes the entire immutable list.
    pub fn flush_table(&self, table_id: &str) -> Result<(), BufferError> {
        let (drained, flush_lsn) = {
            let mut inner = self.lock_inner()?;
            let mem = inner
                .mutable
                .remove(table_id)
                .ok_or_else(|| BufferError::TableNotFound(table_id.to_string()))?;
            inner.immutable.push(mem);

            let flush_lsn = Self::flush_lsn_locked(&inner);
            (std::mem::take(&mut inner.immutable), flush_lsn)
        };

        self.serialize_drained(drained, flush_lsn)?;
        Ok(())
    }

    /// Flushes every table: promotes all non-empty memtables (empty ones
    /// stay mutable to avoid churn), drains the immutable list, and
    /// serializes each entry. Returns the serialized table ids.
    pub fn flush_all(&self) -> Result<BTreeSet<String>, BufferError> {
        let (drained, flush_lsn) = {
            let mut inner = self.lock_inner()?;

            let promoted: Vec<String> = inner
                .mutable
                .iter()
                .filter(|(_, mem)| !mem.is_empty())
                .map(|(id, _)| id.clone())
                .collect();
            for table_id in promoted {
                if let Some(mem) = inner.mutable.remove(&table_id) {
                    inner.immutable.push(mem);
                }
            }

            let flush_lsn = Self::flush_lsn_locked(&inner);
            (std::mem::take(&mut inner.immutable), flush_lsn)
        };

        self.serialize_drained(drained, flush_lsn)
    }

    /// Serializes a drained immutable list under the serialization lock.
    ///
    /// Every memtable is attempted; failures are requeued onto the
    /// immutable list after the pass and the first error is returned, so
    /// a failed segment write never drops data.
    fn serialize_drained(
        &self,
        drained: Vec<MemTable>,
        flush_lsn: u64,
    ) -> Result<BTreeSet<String>, BufferError> {
        if drained.is_empty() {
            return Ok(BTreeSet::new());
        }

        let mut serialized = BTreeSet::new();
        let mut failed = Vec::new();
        let mut first_error: Option<BufferError> = None;

        {
            let _guard = self
                .serialize_mtx
                .lock()
                .map_err(|_| BufferError::Internal("serialization mutex poisoned".into()))?;

            for mut mem in drained {
                let table_id = mem.table_id().to_string();
                match mem.serialize(flush_lsn, self.writer.as_ref()) {
                    Ok(()) => {
                        serialized.insert(table_id);
                    }
                    Err(e) => {
                        error!(%table_id, error = %e, "serialize failed, memtable requeued");
                        if first_error.is_none() {
                            first_error = Some(e.into());
                        }
                        failed.push(mem);
                    }
                }
            }
        }

        info!(
            flush_lsn,
            serialized = serialized.len(),
            requeued = failed.len(),
            "flush pass completed"
        );

        if !failed.is_empty() {
            let mut inner = self.lock_inner()?;
            inner.immutable.extend(failed);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(serialized),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Erase
    // --------------------------------------------------------------------------------------------

    /// Drops every buffered memtable of `table_id`, mutable or immutable.
    ///
    /// Takes the serialization lock as well, so an in-flight flush pass
    /// finishes before the immutable list is rebuilt. Returns
    /// `TableNotFound` when the table was buffered nowhere.
    pub fn erase_table(&self, table_id: &str) -> Result<(), BufferError> {
        let mut inner = self.lock_inner()?;
        let _guard = self
            .serialize_mtx
            .lock()
            .map_err(|_| BufferError::Internal("serialization mutex poisoned".into()))?;

        let had_mutable = inner.mutable.remove(table_id).is_some();
        let before = inner.immutable.len();
        inner.immutable.retain(|mem| mem.table_id() != table_id);
        let had_immutable = inner.immutable.len() != before;

        if !had_mutable && !had_immutable {
            return Err(BufferError::TableNotFound(table_id.to_string()));
        }

        info!(%table_id, had_mutable, had_immutable, "table erased from buffers");
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Reporters
    // --------------------------------------------------------------------------------------------

    /// Bytes buffered in mutable memtables.
    pub fn mutable_mem(&self) -> Result<usize, BufferError> {
        let inner = self.lock_inner()?;
        Ok(inner.mutable.values().map(MemTable::current_mem).sum())
    }

    /// Bytes buffered in immutable memtables awaiting serialization.
    pub fn immutable_mem(&self) -> Result<usize, BufferError> {
        let inner = self.lock_inner()?;
        Ok(inner.immutable.iter().map(MemTable::current_mem).sum())
    }

    /// Total buffered bytes, mutable plus immutable, under one lock
    /// acquisition.
    pub fn current_mem(&self) -> Result<usize, BufferError> {
        let inner = self.lock_inner()?;
        let mutable: usize = inner.mutable.values().map(MemTable::current_mem).sum();
        let immutable: usize = inner.immutable.iter().map(MemTable::current_mem).sum();
        Ok(mutable + immutable)
    }

    /// Highest LSN across the mutable map.
    pub fn max_lsn(&self) -> Result<u64, BufferError> {
        let inner = self.lock_inner()?;
        Ok(inner.mutable.values().map(MemTable::lsn).max().unwrap_or(0))
    }

    /// Ids of tables currently holding a mutable memtable, sorted.
    pub fn mutable_table_ids(&self) -> Result<Vec<String>, BufferError> {
        let inner = self.lock_inner()?;
        let mut ids: Vec<String> = inner.mutable.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Ids of tables currently on the immutable list, in promotion order.
    pub fn immutable_table_ids(&self) -> Result<Vec<String>, BufferError> {
        let inner = self.lock_inner()?;
        Ok(inner
            .immutable
            .iter()
            .map(|mem| mem.table_id().to_string())
            .collect())
    }
}
