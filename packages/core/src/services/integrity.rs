//! Nested-set Integrity Checks
//!
//! Validates a full table scan (ordered by `left`) against the nested-set
//! invariants:
//!
//! 1. The root is the only parentless row, starts at `left = 1`, and
//!    `right = 2 * rows`.
//! 2. Every row is strictly inside its parent's range, and its parent is
//!    the innermost row enclosing it; ranges never partially overlap.
//! 3. `right - left == 2 * descendants + 1` for every row.
//! 4. The `left` and `right` values together are exactly `1..=2 * rows`.
//!
//! Violations are reported, never repaired.

use crate::db::StoredRow;
use crate::models::{NodeId, ROOT_LEFT};
use crate::services::TreeIndexError;
use std::collections::HashSet;

/// Summary of a table that passed every check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegrityReport {
    pub rows: usize,
    pub max_right: i64,
    /// Deepest nesting level, the root being depth 0
    pub max_depth: usize,
}

/// Check `rows` (ascending `left`) against every invariant
pub fn check_rows(rows: &[StoredRow]) -> Result<IntegrityReport, TreeIndexError> {
    let Some(root) = rows.first() else {
        return Ok(IntegrityReport::default());
    };

    let expected_max = 2 * rows.len() as i64;
    if root.parent_id.is_some() || root.left != ROOT_LEFT || root.right != expected_max {
        return Err(TreeIndexError::range_conflict(format!(
            "root row {} has range ({}, {}), expected ({}, {}) for {} rows",
            root.id,
            root.left,
            root.right,
            ROOT_LEFT,
            expected_max,
            rows.len()
        )));
    }

    check_positions(rows, expected_max)?;

    // (id, left, right, descendants seen so far)
    let mut open: Vec<(NodeId, i64, i64, i64)> = Vec::new();
    let mut ids = HashSet::with_capacity(rows.len());
    let mut max_depth = 0;

    for row in rows {
        if !ids.insert(row.id) {
            return Err(TreeIndexError::range_conflict(format!(
                "duplicate row id {}",
                row.id
            )));
        }
        if row.left >= row.right || (row.right - row.left) % 2 == 0 {
            return Err(TreeIndexError::range_conflict(format!(
                "row {} has malformed range ({}, {})",
                row.id, row.left, row.right
            )));
        }

        while let Some(&(id, left, right, seen)) = open.last() {
            if row.left > right {
                close_span(id, left, right, seen)?;
                open.pop();
            } else if row.right > right {
                return Err(TreeIndexError::range_conflict(format!(
                    "row {} ({}, {}) overlaps row {} ({}, {})",
                    row.id, row.left, row.right, id, left, right
                )));
            } else {
                break;
            }
        }

        match (open.last(), row.parent_id) {
            (None, None) => {}
            (Some(&(enclosing, ..)), Some(parent)) if enclosing == parent => {}
            (enclosing, parent) => {
                return Err(TreeIndexError::range_conflict(format!(
                    "row {} names parent {:?} but is enclosed by {:?}",
                    row.id,
                    parent.map(NodeId::value),
                    enclosing.map(|e| e.0.value())
                )));
            }
        }

        for ancestor in open.iter_mut() {
            ancestor.3 += 1;
        }
        open.push((row.id, row.left, row.right, 0));
        max_depth = max_depth.max(open.len() - 1);
    }

    while let Some((id, left, right, seen)) = open.pop() {
        close_span(id, left, right, seen)?;
    }

    Ok(IntegrityReport {
        rows: rows.len(),
        max_right: expected_max,
        max_depth,
    })
}

/// Every value in `1..=expected_max` used exactly once
fn check_positions(rows: &[StoredRow], expected_max: i64) -> Result<(), TreeIndexError> {
    let mut positions: Vec<i64> = rows.iter().flat_map(|r| [r.left, r.right]).collect();
    positions.sort_unstable();

    for (expected, actual) in (ROOT_LEFT..=expected_max).zip(positions.iter()) {
        if *actual != expected {
            return Err(TreeIndexError::range_conflict(format!(
                "traversal value {} is missing or duplicated (found {})",
                expected, actual
            )));
        }
    }
    Ok(())
}

fn close_span(id: NodeId, left: i64, right: i64, descendants: i64) -> Result<(), TreeIndexError> {
    if right - left != 2 * descendants + 1 {
        return Err(TreeIndexError::range_conflict(format!(
            "row {} spans ({}, {}) but has {} descendants",
            id, left, right, descendants
        )));
    }
    Ok(())
}
