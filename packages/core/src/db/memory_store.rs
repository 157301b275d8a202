//! In-process TreeStore
//!
//! `MemoryTreeStore` keeps each table as an ordered map guarded by a tokio
//! `RwLock`. It follows the same transaction contract as the libsql store:
//!
//! - A write transaction holds the write lock for its whole lifetime and
//!   works on a private working set; `commit()` publishes it, anything else
//!   (rollback, error, drop) throws it away.
//! - A read transaction takes a snapshot under the read lock and releases
//!   the lock immediately.
//!
//! Tables are shared behind `Arc`. Snapshots and working sets copy only the
//! map of handles, and a table is cloned the first time a writer changes it.

use crate::db::{
    DatabaseError, NewRow, RangeField, RangeScan, RangeShift, StoredRow, TransactionMode,
    TreeStore, TreeTransaction,
};
use crate::models::{NodeId, TreeSchema};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    rows: BTreeMap<NodeId, StoredRow>,
    next_id: i64,
}

type Tables = HashMap<String, Arc<MemoryTable>>;

/// TreeStore that lives entirely in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryTreeStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn open_transaction(&self, mode: TransactionMode) -> MemoryTransaction {
        let state = match mode {
            TransactionMode::Read => {
                let snapshot = self.tables.read().await.clone();
                TxnState::Read { snapshot }
            }
            TransactionMode::Write => {
                let guard = self.tables.clone().write_owned().await;
                let working = guard.clone();
                TxnState::Write { guard, working }
            }
        };
        MemoryTransaction { state }
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn prepare_schema(&self, schema: &TreeSchema) -> Result<(), DatabaseError> {
        schema.validate()?;
        let mut tables = self.tables.write().await;
        tables.entry(schema.table.clone()).or_default();
        Ok(())
    }

    async fn begin(
        &self,
        mode: TransactionMode,
    ) -> Result<Box<dyn TreeTransaction>, DatabaseError> {
        Ok(Box::new(self.open_transaction(mode).await))
    }
}

enum TxnState {
    Read {
        snapshot: Tables,
    },
    Write {
        guard: OwnedRwLockWriteGuard<Tables>,
        working: Tables,
    },
}

/// Transaction over a `MemoryTreeStore`
pub struct MemoryTransaction {
    state: TxnState,
}

impl MemoryTransaction {
    fn table(&self, schema: &TreeSchema) -> Result<&MemoryTable, DatabaseError> {
        let tables = match &self.state {
            TxnState::Read { snapshot } => snapshot,
            TxnState::Write { working, .. } => working,
        };
        tables
            .get(&schema.table)
            .map(Arc::as_ref)
            .ok_or_else(|| DatabaseError::sql_execution(format!("no such table: {}", schema.table)))
    }

    fn table_mut(
        &mut self,
        schema: &TreeSchema,
        operation: &str,
    ) -> Result<&mut MemoryTable, DatabaseError> {
        match &mut self.state {
            TxnState::Read { .. } => Err(DatabaseError::transaction_failed(format!(
                "{} is not allowed in a read transaction",
                operation
            ))),
            TxnState::Write { working, .. } => working
                .get_mut(&schema.table)
                .map(Arc::make_mut)
                .ok_or_else(|| {
                    DatabaseError::sql_execution(format!("no such table: {}", schema.table))
                }),
        }
    }
}

#[async_trait]
impl TreeTransaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        match self.state {
            TxnState::Read { .. } => TransactionMode::Read,
            TxnState::Write { .. } => TransactionMode::Write,
        }
    }

    async fn fetch_row(
        &mut self,
        schema: &TreeSchema,
        id: NodeId,
    ) -> Result<Option<StoredRow>, DatabaseError> {
        Ok(self.table(schema)?.rows.get(&id).cloned())
    }

    async fn execute_range_update(
        &mut self,
        schema: &TreeSchema,
        shift: &RangeShift,
    ) -> Result<u64, DatabaseError> {
        let table = self.table_mut(schema, "Range update")?;

        let mut touched = 0;
        for row in table.rows.values_mut() {
            if guard_matches(shift, row) {
                (row.left, row.right) = shift.shifted(row.left, row.right);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn insert_row(
        &mut self,
        schema: &TreeSchema,
        row: &NewRow,
    ) -> Result<NodeId, DatabaseError> {
        let table = self.table_mut(schema, "Insert")?;

        if row.left >= row.right {
            return Err(DatabaseError::sql_execution(format!(
                "CHECK constraint failed: {} < {}",
                schema.left_field, schema.right_field
            )));
        }
        if let Some(parent_id) = row.parent_id {
            if !table.rows.contains_key(&parent_id) {
                return Err(DatabaseError::sql_execution(format!(
                    "FOREIGN KEY constraint failed: no parent {}",
                    parent_id
                )));
            }
        }

        let id = match row.id {
            Some(id) if table.rows.contains_key(&id) => {
                return Err(DatabaseError::sql_execution(format!(
                    "UNIQUE constraint failed: {}.{} = {}",
                    schema.table, schema.id_field, id
                )));
            }
            Some(id) => id,
            None => NodeId(table.next_id.max(1)),
        };
        table.next_id = table.next_id.max(id.0 + 1);

        table.rows.insert(
            id,
            StoredRow {
                id,
                parent_id: row.parent_id,
                left: row.left,
                right: row.right,
                properties: row.properties.clone(),
            },
        );
        Ok(id)
    }

    async fn delete_rows(
        &mut self,
        schema: &TreeSchema,
        lower: i64,
        upper: i64,
    ) -> Result<u64, DatabaseError> {
        let table = self.table_mut(schema, "Delete")?;

        let before = table.rows.len();
        table
            .rows
            .retain(|_, row| !(row.left >= lower && row.right <= upper));
        Ok((before - table.rows.len()) as u64)
    }

    async fn scan_ordered(
        &mut self,
        schema: &TreeSchema,
        scan: &RangeScan,
    ) -> Result<Vec<StoredRow>, DatabaseError> {
        let mut rows: Vec<StoredRow> = self
            .table(schema)?
            .rows
            .values()
            .filter(|row| scan.matches(row.left, row.right))
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.left);
        Ok(rows)
    }

    async fn count_at_positions(
        &mut self,
        schema: &TreeSchema,
        positions: &[i64],
    ) -> Result<u64, DatabaseError> {
        let count = self
            .table(schema)?
            .rows
            .values()
            .filter(|row| positions.contains(&row.left) || positions.contains(&row.right))
            .count();
        Ok(count as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let MemoryTransaction { state } = *self;
        if let TxnState::Write { mut guard, working } = state {
            *guard = working;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Whether the guard of `shift` selects `row`
fn guard_matches(shift: &RangeShift, row: &StoredRow) -> bool {
    let value = match shift.threshold_field {
        RangeField::Left => row.left,
        RangeField::Right => row.right,
    };
    value >= shift.threshold
}
