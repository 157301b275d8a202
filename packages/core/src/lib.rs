//! NestedSet Core - Hierarchical Data in Relational Tables
//!
//! This crate stores trees in a single relational table using the nested-set
//! (modified preorder traversal) encoding and keeps that encoding consistent
//! under inserts and subtree deletes.
//!
//! # Architecture
//!
//! - **Range encoding**: Every row carries `(left, right)`; descendants are
//!   exactly the rows nested inside that range
//! - **Table as source of truth**: Ranges are re-read inside each
//!   transaction, nothing is cached between calls
//! - **Pure JSON payload**: Record data lives in a `properties` column next to
//!   the structural columns
//! - **libsql**: Embedded SQLite-compatible database in WAL mode
//!
//! # Modules
//!
//! - [`models`] - Data structures (NodeRecord, TreeSchema)
//! - [`db`] - Range planning, the storage contract and its implementations
//! - [`services`] - The tree index engine and tree assembly
//! - [`config`] - Serde configuration for opening an index

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::TreeIndexConfig;
pub use models::*;
pub use services::*;
