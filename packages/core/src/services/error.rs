//! Service Layer Error Types
//!
//! This module defines the error taxonomy of the tree index. Every variant
//! names the precondition or invariant that failed; storage failures are
//! wrapped unchanged.

use crate::db::DatabaseError;
use crate::models::NodeId;
use thiserror::Error;

/// Tree index operation errors
///
/// Any error returned by a mutation means its transaction was rolled back.
#[derive(Error, Debug)]
pub enum TreeIndexError {
    /// Operation needs a persisted node with a known range
    #[error("Detached node: {context}")]
    DetachedParent { context: String },

    /// Attempt to delete the tree root
    #[error("The root node {id} cannot be deleted")]
    RootDeletion { id: NodeId },

    /// No row exists for the referenced id
    #[error("Node not found: {id}")]
    NotFound { id: NodeId },

    /// A consistency check found an invariant violation
    #[error("Range conflict: {context}")]
    RangeConflict { context: String },

    /// Storage collaborator failure
    #[error("Storage operation failed: {0}")]
    Storage(#[from] DatabaseError),

    /// Configuration rejected before any storage access
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TreeIndexError {
    /// Create a detached node error
    pub fn detached_parent(context: impl Into<String>) -> Self {
        Self::DetachedParent {
            context: context.into(),
        }
    }

    /// Create a root deletion error
    pub fn root_deletion(id: NodeId) -> Self {
        Self::RootDeletion { id }
    }

    /// Create a node not found error
    pub fn not_found(id: NodeId) -> Self {
        Self::NotFound { id }
    }

    /// Create a range conflict error
    pub fn range_conflict(context: impl Into<String>) -> Self {
        Self::RangeConflict {
            context: context.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
