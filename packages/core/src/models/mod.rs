//! Data Models
//!
//! This module contains the data structures shared by the storage and
//! service layers:
//!
//! - `NodeRecord` - One row of a nested-set tree with its lazy child list
//! - `TreeSchema` - Table and column names identifying a hierarchy

mod node_record;
mod tree_schema;

pub use node_record::{Children, NodeId, NodeRecord, ROOT_LEFT};
pub use tree_schema::{
    TreeSchema, ID_FIELD_NAME, LEFT_FIELD_NAME, PARENT_FIELD_NAME, PROPERTIES_FIELD_NAME,
    RIGHT_FIELD_NAME,
};
