//! # Vector Batch Module
//!
//! ## Design Invariants
//!
//! - A [`VectorBatch`] is immutable once constructed.
//! - The payload element count always equals `count · dimension`, and the
//!   id array always holds exactly `count` identifiers — the constructors
//!   reject anything else, so downstream code never re-validates.
//! - Empty batches are unrepresentable.
//!
//! The element kind is a tagged union: float32 vectors carry `Vec<f32>`,
//! packed-byte vectors carry `Vec<u8>`. Both payload forms travel with the
//! same 64-bit id array.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

use crate::error::ErrorCode;

/// A 64-bit vector identifier, assigned by the caller.
pub type VectorId = i64;

/// Bytes occupied by one identifier.
pub const ID_BYTES: usize = std::mem::size_of::<VectorId>();

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised while constructing a [`VectorBatch`].
#[derive(Debug, Error)]
pub enum BatchError {
    /// The batch carries no vectors.
    #[error("batch is empty")]
    Empty,

    /// The payload length is not a multiple of the declared dimension, or
    /// does not match the id count.
    #[error("payload holds {elements} elements, expected {count} x {dimension}")]
    PayloadMismatch {
        elements: usize,
        count: usize,
        dimension: usize,
    },

    /// The dimension is zero.
    #[error("dimension must be non-zero")]
    ZeroDimension,
}

impl BatchError {
    /// Classification of this error into the public code space.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

// ------------------------------------------------------------------------------------------------
// Vector Batch
// ------------------------------------------------------------------------------------------------

/// The element kind a table stores, fixed by its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// 32-bit IEEE-754 floats.
    Float32,

    /// Packed bytes (binary vectors).
    Binary,
}

impl ElementKind {
    /// Bytes occupied by a single element of this kind.
    pub fn element_bytes(&self) -> usize {
        match self {
            ElementKind::Float32 => std::mem::size_of::<f32>(),
            ElementKind::Binary => std::mem::size_of::<u8>(),
        }
    }
}

/// The payload of a batch, tagged by element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    /// `count · dimension` floats, row-major.
    Float32(Vec<f32>),

    /// `count · dimension` packed bytes, row-major.
    Binary(Vec<u8>),
}

impl VectorData {
    /// The element kind this payload carries.
    pub fn kind(&self) -> ElementKind {
        match self {
            VectorData::Float32(_) => ElementKind::Float32,
            VectorData::Binary(_) => ElementKind::Binary,
        }
    }

    /// Number of scalar elements in the payload.
    pub fn elements(&self) -> usize {
        match self {
            VectorData::Float32(data) => data.len(),
            VectorData::Binary(data) => data.len(),
        }
    }

    /// Raw byte size of the payload.
    pub fn payload_bytes(&self) -> usize {
        self.elements() * self.kind().element_bytes()
    }
}

/// An immutable batch of vectors plus their identifiers.
///
/// Created on the insert path, consumed once by a memtable, then handed to
/// the segment writer during flush.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorBatch {
    dimension: usize,
    data: VectorData,
    ids: Vec<VectorId>,
}

impl VectorBatch {
    /// Builds a float32 batch.
    ///
    /// `data` must hold `ids.len() · dimension` floats.
    pub fn float32(
        dimension: usize,
        data: Vec<f32>,
        ids: Vec<VectorId>,
    ) -> Result<Self, BatchError> {
        Self::build(dimension, VectorData::Float32(data), ids)
    }

    /// Builds a packed-byte batch.
    ///
    /// `data` must hold `ids.len() · dimension` bytes.
    pub fn binary(dimension: usize, data: Vec<u8>, ids: Vec<VectorId>) -> Result<Self, BatchError> {
        Self::build(dimension, VectorData::Binary(data), ids)
    }

    fn build(dimension: usize, data: VectorData, ids: Vec<VectorId>) -> Result<Self, BatchError> {
        if dimension == 0 {
            return Err(BatchError::ZeroDimension);
        }
        if ids.is_empty() {
            return Err(BatchError::Empty);
        }
        if data.elements() != ids.len() * dimension {
            return Err(BatchError::PayloadMismatch {
                elements: data.elements(),
                count: ids.len(),
                dimension,
            });
        }

        Ok(Self {
            dimension,
            data,
            ids,
        })
    }

    /// Number of vectors in the batch.
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Per-vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The element kind of the payload.
    pub fn kind(&self) -> ElementKind {
        self.data.kind()
    }

    /// The tagged payload.
    pub fn data(&self) -> &VectorData {
        &self.data
    }

    /// The id array, one entry per vector.
    pub fn ids(&self) -> &[VectorId] {
        &self.ids
    }

    /// Byte footprint of the batch: payload bytes plus id bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.data.payload_bytes() + self.ids.len() * ID_BYTES
    }
}
