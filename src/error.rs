//! Stable error-code space surfaced across the public API.
//!
//! Every public error type in this crate exposes a `code()` method mapping
//! it into [`ErrorCode`]. The dispatch layer that fronts this core
//! translates these codes onto its wire protocol; keeping the space small
//! and closed is part of that contract.

/// Coarse classification of an error, independent of the module it
/// originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed input: dimension mismatch, empty batch, out-of-range
    /// threshold, bad partition tag.
    InvalidArgument,

    /// A named table, partition, or configuration key does not exist.
    NotFound,

    /// An entity with the same identity already exists (duplicate
    /// partition tag).
    AlreadyExists,

    /// The segment writer failed; the affected memtable is retained and
    /// will be retried on the next flush.
    IoError,

    /// A resource budget was exhausted. Reserved for the dispatch layer's
    /// admission control; no operation in this core produces it.
    ResourceExhausted,

    /// Invariant violation or poisoned lock.
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXIST",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}
