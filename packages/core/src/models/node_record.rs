//! Node Record Data Structures
//!
//! This module defines `NodeRecord`, the in-memory form of one row of a
//! nested-set tree table, together with its identifier type and the
//! tri-state child list.
//!
//! # Range Encoding
//!
//! Every persisted node carries a `(left, right)` pair. A node B is a
//! descendant of A exactly when `A.left < B.left < B.right < A.right`, and
//! `(right - left - 1) / 2` is the number of descendants.
//!
//! # Examples
//!
//! ```rust
//! use nestedset_core::models::{Children, NodeId, NodeRecord};
//! use serde_json::json;
//!
//! let root = NodeRecord::root(json!({ "name": "Catalog" }));
//! assert_eq!(root.id, Some(NodeId::ROOT));
//! assert_eq!((root.left, root.right), (1, 2));
//!
//! let child = NodeRecord::new_child(&root, json!({ "name": "Electronics" }));
//! assert!(child.id.is_none());
//! assert_eq!(child.children, Children::Unloaded);
//! ```

use crate::db::StoredRow;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Left value of the root row
pub const ROOT_LEFT: i64 = 1;

/// Row identifier assigned by the storage layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl NodeId {
    /// Identifier of the tree root row
    pub const ROOT: NodeId = NodeId(0);

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Lazily materialized child list
///
/// A fetched empty list is `Empty`, never `Unloaded`; an unfetched list is
/// never treated as a leaf.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Children {
    /// Children have not been fetched
    #[default]
    Unloaded,
    /// Children were fetched and there are none
    Empty,
    /// Children were fetched, in left-to-right order
    Populated(Vec<NodeRecord>),
}

impl Children {
    /// Build a loaded list from fetched children
    pub fn from_vec(children: Vec<NodeRecord>) -> Self {
        if children.is_empty() {
            Self::Empty
        } else {
            Self::Populated(children)
        }
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self, Self::Unloaded)
    }

    /// Loaded children, or an empty slice when nothing was fetched yet
    pub fn as_slice(&self) -> &[NodeRecord] {
        match self {
            Self::Populated(children) => children,
            Self::Unloaded | Self::Empty => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Append a child to a loaded list
    ///
    /// Returns `false` (and leaves the list untouched) when the list is
    /// `Unloaded`, since a partial list would be indistinguishable from a
    /// complete one.
    pub fn push(&mut self, child: NodeRecord) -> bool {
        match self {
            Self::Unloaded => false,
            Self::Empty => {
                *self = Self::Populated(vec![child]);
                true
            }
            Self::Populated(children) => {
                children.push(child);
                true
            }
        }
    }
}

/// One row of a nested-set tree table
///
/// # Fields
///
/// - `id`: Storage identity, `None` until the node is inserted
/// - `parent_id`: Parent row, `None` for the root
/// - `left` / `right`: Preorder range; both are `0` while the range is unknown
/// - `properties`: Record payload stored alongside the range columns
/// - `children`: Tri-state child list (see [`Children`])
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub id: Option<NodeId>,
    pub parent_id: Option<NodeId>,
    pub left: i64,
    pub right: i64,
    pub properties: Value,
    pub children: Children,
}

impl NodeRecord {
    /// The root record as it is created on an empty table
    pub fn root(properties: Value) -> Self {
        Self {
            id: Some(NodeId::ROOT),
            parent_id: None,
            left: ROOT_LEFT,
            right: ROOT_LEFT + 1,
            properties,
            children: Children::Empty,
        }
    }

    /// A transient node that will be inserted under `parent`
    ///
    /// The range stays unassigned until the insert commits.
    pub fn new_child(parent: &NodeRecord, properties: Value) -> Self {
        Self {
            id: None,
            parent_id: parent.id,
            left: 0,
            right: 0,
            properties,
            children: Children::Unloaded,
        }
    }

    /// Convert a stored row, leaving the child list unloaded
    pub fn from_stored(row: StoredRow) -> Self {
        Self {
            id: Some(row.id),
            parent_id: row.parent_id,
            left: row.left,
            right: row.right,
            properties: row.properties,
            children: Children::Unloaded,
        }
    }

    /// Convert a stored row, marking leaves as loaded-empty
    ///
    /// A leaf range proves there is nothing to fetch.
    pub fn from_stored_shallow(row: StoredRow) -> Self {
        let mut record = Self::from_stored(row);
        if record.is_leaf() {
            record.children = Children::Empty;
        }
        record
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.is_persisted() && self.parent_id.is_none()
    }

    /// Whether a usable range has been loaded
    pub fn has_range(&self) -> bool {
        self.left >= ROOT_LEFT && self.right - self.left >= 1
    }

    pub fn is_leaf(&self) -> bool {
        self.has_range() && self.right - self.left == 1
    }

    /// Number of descendants encoded by the range
    pub fn descendant_count(&self) -> i64 {
        if self.has_range() {
            (self.right - self.left - 1) / 2
        } else {
            0
        }
    }

    /// Strict range containment, i.e. `other` is a descendant of `self`
    pub fn contains(&self, other: &NodeRecord) -> bool {
        self.left < other.left && other.right < self.right
    }

    /// Depth-first walk over the loaded descendants, excluding `self`
    pub fn preorder(&self) -> Vec<&NodeRecord> {
        let mut visited = Vec::new();
        let mut pending: Vec<&NodeRecord> = self.children.as_slice().iter().rev().collect();
        while let Some(node) = pending.pop() {
            visited.push(node);
            pending.extend(node.children.as_slice().iter().rev());
        }
        visited
    }

    /// Nested JSON export of this node and its loaded children
    ///
    /// Unloaded child lists export as an empty array.
    pub fn to_json(&self) -> Value {
        let children: Vec<Value> = self
            .children
            .as_slice()
            .iter()
            .map(NodeRecord::to_json)
            .collect();

        json!({
            "id": self.id,
            "parent": self.parent_id,
            "left": self.left,
            "right": self.right,
            "properties": self.properties,
            "children": children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: i64, parent: Option<i64>, left: i64, right: i64) -> StoredRow {
        StoredRow {
            id: NodeId(id),
            parent_id: parent.map(NodeId),
            left,
            right,
            properties: json!({}),
        }
    }

    #[test]
    fn test_root_record_range() {
        let root = NodeRecord::root(json!({}));
        assert!(root.is_root());
        assert!(root.is_leaf());
        assert_eq!(root.descendant_count(), 0);
        assert_eq!(root.children, Children::Empty);
    }

    #[test]
    fn test_transient_child_has_no_range() {
        let root = NodeRecord::root(json!({}));
        let child = NodeRecord::new_child(&root, json!({"name": "A"}));
        assert_eq!(child.parent_id, Some(NodeId::ROOT));
        assert!(!child.has_range());
        assert!(!child.is_persisted());
    }

    #[test]
    fn test_descendant_count_from_range() {
        let node = NodeRecord::from_stored(stored(1, Some(0), 2, 9));
        assert_eq!(node.descendant_count(), 3);
        assert!(!node.is_leaf());
    }

    #[test]
    fn test_shallow_conversion_marks_leaves_loaded() {
        let leaf = NodeRecord::from_stored_shallow(stored(2, Some(1), 3, 4));
        let inner = NodeRecord::from_stored_shallow(stored(1, Some(0), 2, 7));
        assert_eq!(leaf.children, Children::Empty);
        assert_eq!(inner.children, Children::Unloaded);
    }

    #[test]
    fn test_children_push_respects_unloaded() {
        let child = NodeRecord::from_stored(stored(2, Some(1), 3, 4));

        let mut unloaded = Children::Unloaded;
        assert!(!unloaded.push(child.clone()));
        assert_eq!(unloaded, Children::Unloaded);

        let mut empty = Children::Empty;
        assert!(empty.push(child));
        assert_eq!(empty.len(), 1);
        assert!(empty.is_loaded());
    }

    #[test]
    fn test_contains_is_strict() {
        let outer = NodeRecord::from_stored(stored(1, Some(0), 2, 7));
        let inner = NodeRecord::from_stored(stored(2, Some(1), 3, 4));
        let sibling = NodeRecord::from_stored(stored(3, Some(0), 8, 9));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&outer));
        assert!(!outer.contains(&sibling));
    }

    #[test]
    fn test_to_json_nests_children() {
        let mut root = NodeRecord::root(json!({"name": "root"}));
        root.right = 4;
        let mut child = NodeRecord::from_stored(stored(1, Some(0), 2, 3));
        child.children = Children::Empty;
        root.children = Children::from_vec(vec![child]);

        let exported = root.to_json();
        assert_eq!(exported["id"], json!(0));
        assert_eq!(exported["parent"], Value::Null);
        assert_eq!(exported["children"][0]["id"], json!(1));
        assert_eq!(exported["children"][0]["parent"], json!(0));
        assert_eq!(exported["children"][0]["children"], json!([]));
    }
}
