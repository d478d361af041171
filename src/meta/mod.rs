//! # Metadata Module
//!
//! The buffering core does not own table metadata — it consults an external
//! store through the [`MetaStore`] trait. The memtable queries the schema
//! lazily on the first add to a table so that dimension and element-kind
//! validation happens exactly once per memtable lifetime.
//!
//! Partitions are named sub-tables addressed by `(table_id, tag)`. Creating
//! a partition registers a derived partition table under the parent's
//! schema; duplicate tags are rejected.
//!
//! [`InMemoryMetaStore`] is a complete in-process implementation used by
//! tests and by embedders that keep their catalog elsewhere.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;

use crate::batch::ElementKind;
use crate::error::ErrorCode;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by a [`MetaStore`].
#[derive(Debug, Error)]
pub enum MetaError {
    /// The named table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A partition with the same tag already exists on the table.
    #[error("partition already exists: table {table_id}, tag {tag}")]
    PartitionAlreadyExists { table_id: String, tag: String },

    /// The partition tag is malformed (empty or containing whitespace).
    #[error("invalid partition tag: {0:?}")]
    InvalidPartitionTag(String),

    /// Invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MetaError {
    /// Classification of this error into the public code space.
    pub fn code(&self) -> ErrorCode {
        match self {
            MetaError::TableNotFound(_) => ErrorCode::NotFound,
            MetaError::PartitionAlreadyExists { .. } => ErrorCode::AlreadyExists,
            MetaError::InvalidPartitionTag(_) => ErrorCode::InvalidArgument,
            MetaError::Internal(_) => ErrorCode::Internal,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Schema
// ------------------------------------------------------------------------------------------------

/// The schema facts the write path needs about a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Unique table identifier.
    pub table_id: String,

    /// Per-vector dimension every batch must match.
    pub dimension: usize,

    /// Element kind every batch must match.
    pub element: ElementKind,

    /// For partition tables, the id of the owning table. Empty for root
    /// tables.
    pub owner_table: String,
}

impl TableSchema {
    /// Schema for a root table.
    pub fn new(table_id: impl Into<String>, dimension: usize, element: ElementKind) -> Self {
        Self {
            table_id: table_id.into(),
            dimension,
            element,
            owner_table: String::new(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// MetaStore Trait
// ------------------------------------------------------------------------------------------------

/// External metadata store consumed by the write path.
pub trait MetaStore: Send + Sync {
    /// Looks up the schema of a table (root or partition).
    fn describe_table(&self, table_id: &str) -> Result<TableSchema, MetaError>;

    /// Registers a partition of `table_id` under `tag`.
    ///
    /// `partition_name` may be empty, in which case a name is derived from
    /// the table id and tag. Fails with `AlreadyExists` for a duplicate
    /// tag and `NotFound` when the parent table is absent.
    fn create_partition(
        &self,
        table_id: &str,
        partition_name: &str,
        tag: &str,
    ) -> Result<(), MetaError>;
}

// ------------------------------------------------------------------------------------------------
// In-memory implementation
// ------------------------------------------------------------------------------------------------

#[derive(Default)]
struct MetaInner {
    /// Root and partition tables by id.
    tables: HashMap<String, TableSchema>,

    /// Partition table id by `(owner table, tag)`.
    partitions: HashMap<(String, String), String>,
}

/// In-process [`MetaStore`] holding schemas in a map.
#[derive(Default)]
pub struct InMemoryMetaStore {
    inner: RwLock<MetaInner>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a root table schema, replacing any previous entry.
    pub fn create_table(&self, schema: TableSchema) -> Result<(), MetaError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| MetaError::Internal("RwLock poisoned".into()))?;
        debug!(table_id = %schema.table_id, dimension = schema.dimension, "table registered");
        inner.tables.insert(schema.table_id.clone(), schema);
        Ok(())
    }

    /// Removes a table and every partition registered under it.
    pub fn drop_table(&self, table_id: &str) -> Result<(), MetaError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| MetaError::Internal("RwLock poisoned".into()))?;

        if inner.tables.remove(table_id).is_none() {
            return Err(MetaError::TableNotFound(table_id.to_string()));
        }

        let partition_ids: Vec<String> = inner
            .partitions
            .iter()
            .filter(|((owner, _), _)| owner == table_id)
            .map(|(_, id)| id.clone())
            .collect();
        for id in &partition_ids {
            inner.tables.remove(id);
        }
        inner.partitions.retain(|(owner, _), _| owner != table_id);

        Ok(())
    }
}

/// Partition tags must be non-empty and free of whitespace.
fn validate_partition_tag(tag: &str) -> Result<(), MetaError> {
    if tag.is_empty() || tag.chars().any(char::is_whitespace) {
        return Err(MetaError::InvalidPartitionTag(tag.to_string()));
    }
    Ok(())
}

impl MetaStore for InMemoryMetaStore {
    fn describe_table(&self, table_id: &str) -> Result<TableSchema, MetaError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| MetaError::Internal("RwLock poisoned".into()))?;
        inner
            .tables
            .get(table_id)
            .cloned()
            .ok_or_else(|| MetaError::TableNotFound(table_id.to_string()))
    }

    fn create_partition(
        &self,
        table_id: &str,
        partition_name: &str,
        tag: &str,
    ) -> Result<(), MetaError> {
        validate_partition_tag(tag)?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| MetaError::Internal("RwLock poisoned".into()))?;

        let owner = inner
            .tables
            .get(table_id)
            .cloned()
            .ok_or_else(|| MetaError::TableNotFound(table_id.to_string()))?;

        // Only root tables own partitions.
        if !owner.owner_table.is_empty() {
            return Err(MetaError::TableNotFound(table_id.to_string()));
        }

        let key = (table_id.to_string(), tag.to_string());
        if inner.partitions.contains_key(&key) {
            return Err(MetaError::PartitionAlreadyExists {
                table_id: table_id.to_string(),
                tag: tag.to_string(),
            });
        }

        let partition_id = if partition_name.is_empty() {
            format!("{table_id}_{tag}")
        } else {
            partition_name.to_string()
        };

        let schema = TableSchema {
            table_id: partition_id.clone(),
            dimension: owner.dimension,
            element: owner.element,
            owner_table: table_id.to_string(),
        };

        debug!(%table_id, %tag, partition_id = %partition_id, "partition registered");
        inner.tables.insert(partition_id.clone(), schema);
        inner.partitions.insert(key, partition_id);

        Ok(())
    }
}
