//! Range arithmetic for nested-set mutations
//!
//! Pure functions that turn the current range of a parent (for inserts) or a
//! node (for deletes) into the bulk shifts the table needs. Nothing here
//! touches storage.
//!
//! Shifts are ordered so that `left < right` holds for every row after each
//! individual statement: inserts widen `right` before `left`, deletes narrow
//! `left` before `right`.

use crate::models::ROOT_LEFT;
use thiserror::Error;

/// Errors produced while planning a range change
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangePlanError {
    #[error("Invalid node range ({left}, {right})")]
    InvalidRange { left: i64, right: i64 },

    #[error("The root range ({left}, {right}) cannot be deleted")]
    RootDeletion { left: i64, right: i64 },
}

/// One of the two traversal columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeField {
    Left,
    Right,
}

/// Bulk update `field += delta WHERE threshold_field >= threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeShift {
    pub field: RangeField,
    pub threshold_field: RangeField,
    pub delta: i64,
    pub threshold: i64,
}

impl RangeShift {
    fn on(field: RangeField, delta: i64, threshold: i64) -> Self {
        Self {
            field,
            threshold_field: field,
            delta,
            threshold,
        }
    }

    /// Apply this shift to a single `(left, right)` pair
    pub fn shifted(&self, left: i64, right: i64) -> (i64, i64) {
        let guard = match self.threshold_field {
            RangeField::Left => left,
            RangeField::Right => right,
        };
        if guard < self.threshold {
            return (left, right);
        }
        match self.field {
            RangeField::Left => (left + self.delta, right),
            RangeField::Right => (left, right + self.delta),
        }
    }
}

/// Range assignment and shifts for inserting a last child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    /// Left value of the new node (the parent's captured right)
    pub left: i64,
    pub right: i64,
    /// Right value the parent will have once the shifts are applied
    pub parent_right_after: i64,
    pub shifts: [RangeShift; 2],
}

/// Rows to remove and shifts to close the gap after deleting a subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePlan {
    pub lower: i64,
    pub upper: i64,
    pub width: i64,
    /// Rows a consistent table holds inside `[lower, upper]`
    pub expected_rows: u64,
    pub shifts: [RangeShift; 2],
}

/// Computes nested-set shift plans
pub struct RangePlanner;

impl RangePlanner {
    /// Plan the insert of a new last child under a parent with range
    /// `(parent_left, parent_right)`
    ///
    /// Both shifts are guarded by the same captured `parent_right`.
    ///
    /// # Examples
    /// ```
    /// use nestedset_core::db::RangePlanner;
    ///
    /// let plan = RangePlanner::plan_insert(1, 2).unwrap();
    /// assert_eq!((plan.left, plan.right), (2, 3));
    /// assert_eq!(plan.parent_right_after, 4);
    /// ```
    pub fn plan_insert(parent_left: i64, parent_right: i64) -> Result<InsertPlan, RangePlanError> {
        validate_range(parent_left, parent_right)?;

        Ok(InsertPlan {
            left: parent_right,
            right: parent_right + 1,
            parent_right_after: parent_right + 2,
            shifts: [
                RangeShift::on(RangeField::Right, 2, parent_right),
                RangeShift::on(RangeField::Left, 2, parent_right),
            ],
        })
    }

    /// Plan the removal of the subtree `[node_left, node_right]`
    ///
    /// Rows with a value strictly greater than `node_right` move down by the
    /// subtree width, expressed as `>= node_right + 1`.
    ///
    /// # Examples
    /// ```
    /// use nestedset_core::db::RangePlanner;
    ///
    /// let plan = RangePlanner::plan_delete(2, 5).unwrap();
    /// assert_eq!(plan.width, 4);
    /// assert_eq!(plan.expected_rows, 2);
    /// assert!(RangePlanner::plan_delete(1, 8).is_err());
    /// ```
    pub fn plan_delete(node_left: i64, node_right: i64) -> Result<DeletePlan, RangePlanError> {
        validate_range(node_left, node_right)?;
        if node_left <= ROOT_LEFT {
            return Err(RangePlanError::RootDeletion {
                left: node_left,
                right: node_right,
            });
        }

        let width = node_right - node_left + 1;
        Ok(DeletePlan {
            lower: node_left,
            upper: node_right,
            width,
            expected_rows: (width / 2) as u64,
            shifts: [
                RangeShift::on(RangeField::Left, -width, node_right + 1),
                RangeShift::on(RangeField::Right, -width, node_right + 1),
            ],
        })
    }
}

/// `left < right`, positive, and an odd span
fn validate_range(left: i64, right: i64) -> Result<(), RangePlanError> {
    if left < ROOT_LEFT || right <= left || (right - left) % 2 == 0 {
        return Err(RangePlanError::InvalidRange { left, right });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(shifts: &[RangeShift], rows: &mut [(i64, i64)]) {
        for shift in shifts {
            for row in rows.iter_mut() {
                *row = shift.shifted(row.0, row.1);
                assert!(row.0 < row.1, "shift {:?} broke {:?}", shift, row);
            }
        }
    }

    #[test]
    fn test_plan_insert_under_leaf_root() {
        let plan = RangePlanner::plan_insert(1, 2).unwrap();
        assert_eq!(plan.left, 2);
        assert_eq!(plan.right, 3);
        assert_eq!(plan.shifts[0].field, RangeField::Right);
        assert_eq!(plan.shifts[1].field, RangeField::Left);
        assert!(plan.shifts.iter().all(|s| s.threshold == 2 && s.delta == 2));
    }

    #[test]
    fn test_plan_insert_shifts_following_rows() {
        // root (1,6), A (2,3), B (4,5); insert under A
        let mut rows = [(1, 6), (2, 3), (4, 5)];
        let plan = RangePlanner::plan_insert(2, 3).unwrap();
        apply_all(&plan.shifts, &mut rows);
        assert_eq!(rows, [(1, 8), (2, 5), (6, 7)]);
        assert_eq!((plan.left, plan.right), (3, 4));
        assert_eq!(plan.parent_right_after, 5);
    }

    #[test]
    fn test_plan_insert_rejects_unloaded_range() {
        assert_eq!(
            RangePlanner::plan_insert(0, 0),
            Err(RangePlanError::InvalidRange { left: 0, right: 0 })
        );
        assert!(RangePlanner::plan_insert(3, 5).is_err());
    }

    #[test]
    fn test_plan_delete_closes_gap() {
        // root (1,8), A (2,5), C (3,4), B (6,7); delete A
        let plan = RangePlanner::plan_delete(2, 5).unwrap();
        assert_eq!(plan.width, 4);
        assert_eq!(plan.expected_rows, 2);

        let mut remaining = [(1, 8), (6, 7)];
        apply_all(&plan.shifts, &mut remaining);
        assert_eq!(remaining, [(1, 4), (2, 3)]);
    }

    #[test]
    fn test_plan_delete_leaf() {
        let plan = RangePlanner::plan_delete(4, 5).unwrap();
        assert_eq!(plan.width, 2);
        assert_eq!(plan.expected_rows, 1);
        assert_eq!(plan.shifts[0].threshold, 6);
    }

    #[test]
    fn test_plan_delete_rejects_root() {
        assert_eq!(
            RangePlanner::plan_delete(1, 4),
            Err(RangePlanError::RootDeletion { left: 1, right: 4 })
        );
    }

    #[test]
    fn test_shift_below_threshold_is_noop() {
        let shift = RangeShift::on(RangeField::Left, 2, 10);
        assert_eq!(shift.shifted(3, 4), (3, 4));
        assert_eq!(shift.shifted(10, 15), (12, 15));
    }
}
