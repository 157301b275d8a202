//! Tree Assembly from Preorder Scans
//!
//! A range scan ordered by `left` is a preorder walk of the subtree, so the
//! parent of every row is the innermost row seen so far whose range still
//! contains it. `TreeAssembler` rebuilds the parent/child links from that
//! property in one pass with a stack of open ancestors.
//!
//! Assembly is pure: it never touches storage.

use crate::models::{Children, NodeId, NodeRecord};
use crate::services::TreeIndexError;

/// Rebuilds in-memory hierarchies from ordered row sets
pub struct TreeAssembler;

impl TreeAssembler {
    /// Link `descendants` (preorder, ascending `left`) under `root`
    ///
    /// Every node of the returned tree has a loaded child list. Fails with
    /// `RangeConflict` when a row falls outside the subtree, is out of
    /// order, or names a parent other than its innermost enclosing row.
    pub fn assemble(
        mut root: NodeRecord,
        descendants: Vec<NodeRecord>,
    ) -> Result<NodeRecord, TreeIndexError> {
        root.children = Children::Empty;
        let mut open: Vec<NodeRecord> = vec![root];

        for mut row in descendants {
            while !open.last().is_some_and(|top| top.contains(&row)) {
                if open.len() == 1 {
                    return Err(TreeIndexError::range_conflict(format!(
                        "row {} ({}, {}) is not inside the assembled subtree",
                        describe(row.id),
                        row.left,
                        row.right
                    )));
                }
                close_top(&mut open)?;
            }

            if let Some(top) = open.last() {
                if row.parent_id != top.id {
                    return Err(TreeIndexError::range_conflict(format!(
                        "row {} names parent {} but its enclosing row is {}",
                        describe(row.id),
                        describe(row.parent_id),
                        describe(top.id)
                    )));
                }
            }

            row.children = Children::Empty;
            open.push(row);
        }

        while open.len() > 1 {
            close_top(&mut open)?;
        }

        open.pop()
            .ok_or_else(|| TreeIndexError::range_conflict("assembly lost the subtree root"))
    }

    /// Keep only the direct children of `parent_id`, preserving scan order
    ///
    /// Leaf children come back loaded-empty; the rest stay unloaded.
    pub fn direct_children(parent_id: NodeId, rows: Vec<NodeRecord>) -> Vec<NodeRecord> {
        rows.into_iter()
            .filter(|row| row.parent_id == Some(parent_id))
            .map(|mut row| {
                row.children = if row.is_leaf() {
                    Children::Empty
                } else {
                    Children::Unloaded
                };
                row
            })
            .collect()
    }
}

/// Pop the innermost open node and attach it to its parent
fn close_top(open: &mut Vec<NodeRecord>) -> Result<(), TreeIndexError> {
    let closed = open
        .pop()
        .ok_or_else(|| TreeIndexError::range_conflict("no open ancestor to close"))?;
    match open.last_mut() {
        Some(parent) => {
            parent.children.push(closed);
            Ok(())
        }
        None => Err(TreeIndexError::range_conflict(
            "closed a node without an enclosing ancestor",
        )),
    }
}

fn describe(id: Option<NodeId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "<none>".to_string(),
    }
}
