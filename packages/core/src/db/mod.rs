//! Database Layer
//!
//! This module holds the storage side of the nested-set index:
//!
//! - Range arithmetic that plans the bulk shifts of an insert or delete
//! - The `TreeStore` / `TreeTransaction` collaborator contract
//! - A libsql implementation (embedded, SQLite-compatible, WAL mode)
//! - An in-process implementation with the same transaction semantics
//!
//! # Architecture
//!
//! The service layer only ever talks to `dyn TreeStore`. SQL text,
//! connection handling and table DDL live in `database` and
//! `libsql_store`; nothing above this module formats SQL.

mod database;
mod error;
mod libsql_store;
mod memory_store;
pub mod range_plan;
mod tree_store;

pub use database::{DatabaseService, DEFAULT_BUSY_TIMEOUT_MS};
pub use error::DatabaseError;
pub use libsql_store::{LibsqlTransaction, LibsqlTreeStore};
pub use memory_store::{MemoryTransaction, MemoryTreeStore};
pub use range_plan::{
    DeletePlan, InsertPlan, RangeField, RangePlanError, RangePlanner, RangeShift,
};
pub use tree_store::{
    NewRow, RangeScan, StoredRow, TransactionMode, TreeStore, TreeTransaction,
};
