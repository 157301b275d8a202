//! Tree Services
//!
//! This module contains the nested-set engine and its pure helpers:
//!
//! - `TreeIndexStore` - Mutations (insert, delete) and range queries
//! - `TreeAssembler` - Rebuilds linked hierarchies from preorder scans
//! - `integrity` - Full-table invariant checks
//!
//! Services only speak to storage through `dyn TreeStore`.

pub mod error;
pub mod integrity;
pub mod tree_assembler;
pub mod tree_index;

pub use error::TreeIndexError;
pub use integrity::IntegrityReport;
pub use tree_assembler::TreeAssembler;
pub use tree_index::TreeIndexStore;
