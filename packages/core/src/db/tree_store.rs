//! TreeStore Trait - Storage Collaborator Contract
//!
//! This module defines the narrow surface the nested-set engine needs from a
//! persistence backend. The engine never builds SQL or touches connections;
//! everything goes through a scoped [`TreeTransaction`].
//!
//! # Contract
//!
//! - **Scoped transactions**: `begin()` hands out a transaction that owns its
//!   connection. Transactions never nest.
//! - **Release on every path**: `commit()` and `rollback()` consume the
//!   transaction. Dropping it unfinished discards its work.
//! - **Write isolation**: `TransactionMode::Write` is serializable against
//!   other writers on the same table.
//! - **Read snapshots**: `TransactionMode::Read` observes one consistent
//!   state of the table and rejects writes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::db::{MemoryTreeStore, RangeScan, TransactionMode, TreeStore};
//! use nestedset_core::models::TreeSchema;
//!
//! # async fn example() -> Result<(), nestedset_core::db::DatabaseError> {
//! let store = MemoryTreeStore::new();
//! let schema = TreeSchema::new("catalog");
//! store.prepare_schema(&schema).await?;
//!
//! let mut tx = store.begin(TransactionMode::Read).await?;
//! let rows = tx.scan_ordered(&schema, &RangeScan::All).await?;
//! tx.commit().await?;
//! assert!(rows.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::db::{DatabaseError, RangeShift};
use crate::models::{NodeId, TreeSchema};
use async_trait::async_trait;
use serde_json::Value;

/// Isolation requested for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Consistent snapshot, writes rejected
    Read,
    /// Exclusive against other writers
    Write,
}

/// A tree row as read from storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub left: i64,
    pub right: i64,
    pub properties: Value,
}

/// A tree row to be inserted
///
/// `id` is normally `None` so the store assigns one; the root row is
/// inserted with an explicit `NodeId::ROOT`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRow {
    pub id: Option<NodeId>,
    pub parent_id: Option<NodeId>,
    pub left: i64,
    pub right: i64,
    pub properties: Value,
}

/// Range condition for an ordered scan
///
/// Results are always ordered by `left` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeScan {
    /// Rows nested in `(left, right)`; `inclusive` also admits the bounds
    /// themselves, i.e. the subtree root
    Within {
        left: i64,
        right: i64,
        inclusive: bool,
    },
    /// Rows whose range strictly encloses `(left, right)`
    Enclosing { left: i64, right: i64 },
    /// Every row of the table
    All,
}

impl RangeScan {
    /// Whether a row with range `(left, right)` satisfies the condition
    pub fn matches(&self, row_left: i64, row_right: i64) -> bool {
        match *self {
            RangeScan::Within {
                left,
                right,
                inclusive: true,
            } => row_left >= left && row_right <= right,
            RangeScan::Within {
                left,
                right,
                inclusive: false,
            } => row_left > left && row_right < right,
            RangeScan::Enclosing { left, right } => row_left < left && row_right > right,
            RangeScan::All => true,
        }
    }
}

/// Persistence backend for nested-set tables
///
/// Implementations must be `Send + Sync` so one store can be shared by
/// concurrent requests.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Create the table described by `schema` if it does not exist
    async fn prepare_schema(&self, schema: &TreeSchema) -> Result<(), DatabaseError>;

    /// Start a transaction on a dedicated connection
    async fn begin(
        &self,
        mode: TransactionMode,
    ) -> Result<Box<dyn TreeTransaction>, DatabaseError>;
}

/// One scoped unit of work against a tree table
#[async_trait]
pub trait TreeTransaction: Send {
    fn mode(&self) -> TransactionMode;

    /// Read one row by identity
    async fn fetch_row(
        &mut self,
        schema: &TreeSchema,
        id: NodeId,
    ) -> Result<Option<StoredRow>, DatabaseError>;

    /// Apply `shift` to every qualifying row, returning the rows touched
    async fn execute_range_update(
        &mut self,
        schema: &TreeSchema,
        shift: &RangeShift,
    ) -> Result<u64, DatabaseError>;

    /// Insert a row, returning its identity
    async fn insert_row(&mut self, schema: &TreeSchema, row: &NewRow)
        -> Result<NodeId, DatabaseError>;

    /// Delete rows with `left >= lower AND right <= upper`
    async fn delete_rows(
        &mut self,
        schema: &TreeSchema,
        lower: i64,
        upper: i64,
    ) -> Result<u64, DatabaseError>;

    /// Fetch rows matching `scan`, ordered by `left` ascending
    async fn scan_ordered(
        &mut self,
        schema: &TreeSchema,
        scan: &RangeScan,
    ) -> Result<Vec<StoredRow>, DatabaseError>;

    /// Count rows whose `left` or `right` equals any of `positions`
    async fn count_at_positions(
        &mut self,
        schema: &TreeSchema,
        positions: &[i64],
    ) -> Result<u64, DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
