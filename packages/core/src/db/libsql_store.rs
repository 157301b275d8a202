//! LibsqlTreeStore - TreeStore Implementation for libsql
//!
//! This module implements the `TreeStore` trait on top of
//! [`DatabaseService`]. It is the only place that generates SQL.
//!
//! # Transactions
//!
//! Every transaction opens its own connection via `connect_with_timeout()`:
//!
//! - `TransactionMode::Write` issues `BEGIN IMMEDIATE`, taking the SQLite
//!   write lock before the first read so that thresholds read inside the
//!   transaction cannot go stale.
//! - `TransactionMode::Read` issues `BEGIN DEFERRED`; under WAL the first read
//!   pins a snapshot for the rest of the transaction.
//!
//! A transaction dropped without `commit()` or `rollback()` closes its
//! connection, and SQLite rolls back whatever was pending.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::db::{DatabaseService, LibsqlTreeStore, TreeStore};
//! use nestedset_core::models::TreeSchema;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Arc::new(DatabaseService::new(PathBuf::from("./data/tree.db")).await?);
//! let store = LibsqlTreeStore::new(db);
//! store.prepare_schema(&TreeSchema::new("catalog")).await?;
//! # Ok(())
//! # }
//! ```

use crate::db::{
    DatabaseError, DatabaseService, NewRow, RangeScan, RangeShift, StoredRow, TransactionMode,
    TreeStore, TreeTransaction,
};
use crate::models::{NodeId, TreeSchema};
use async_trait::async_trait;
use libsql::params::Params;
use libsql::{Connection, Row, Value};
use std::sync::Arc;

/// TreeStore backed by a libsql database file
#[derive(Debug, Clone)]
pub struct LibsqlTreeStore {
    db: Arc<DatabaseService>,
}

impl LibsqlTreeStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Underlying database service
    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }
}

#[async_trait]
impl TreeStore for LibsqlTreeStore {
    async fn prepare_schema(&self, schema: &TreeSchema) -> Result<(), DatabaseError> {
        self.db.ensure_tree_table(schema).await
    }

    async fn begin(
        &self,
        mode: TransactionMode,
    ) -> Result<Box<dyn TreeTransaction>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;

        let statement = match mode {
            TransactionMode::Read => "BEGIN DEFERRED",
            TransactionMode::Write => "BEGIN IMMEDIATE",
        };
        conn.execute(statement, ()).await.map_err(|e| {
            DatabaseError::transaction_failed(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(Box::new(LibsqlTransaction { conn, mode }))
    }
}

/// An open libsql transaction on a dedicated connection
pub struct LibsqlTransaction {
    conn: Connection,
    mode: TransactionMode,
}

impl LibsqlTransaction {
    fn require_write(&self, operation: &str) -> Result<(), DatabaseError> {
        match self.mode {
            TransactionMode::Write => Ok(()),
            TransactionMode::Read => Err(DatabaseError::transaction_failed(format!(
                "{} is not allowed in a read transaction",
                operation
            ))),
        }
    }

    fn select_columns(schema: &TreeSchema) -> String {
        format!(
            "SELECT {}, {}, {}, {}, {} FROM {}",
            schema.id_field,
            schema.parent_field,
            schema.left_field,
            schema.right_field,
            schema.properties_field,
            schema.table
        )
    }

    async fn query_rows(&self, sql: &str, params: Vec<Value>) -> Result<Vec<StoredRow>, DatabaseError> {
        let mut stmt = self.conn.prepare(sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare '{}': {}", sql, e))
        })?;

        let mut rows = stmt
            .query(Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute '{}': {}", sql, e)))?;

        let mut result = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            result.push(row_to_stored(&row)?);
        }
        Ok(result)
    }
}

/// Column order matches `select_columns()`
fn row_to_stored(row: &Row) -> Result<StoredRow, DatabaseError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to read id: {}", e)))?;
    let parent_id: Option<i64> = row
        .get(1)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to read parent: {}", e)))?;
    let left: i64 = row
        .get(2)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to read left: {}", e)))?;
    let right: i64 = row
        .get(3)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to read right: {}", e)))?;
    let properties_str: String = row
        .get(4)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to read properties: {}", e)))?;

    Ok(StoredRow {
        id: NodeId(id),
        parent_id: parent_id.map(NodeId),
        left,
        right,
        properties: serde_json::from_str(&properties_str)?,
    })
}

#[async_trait]
impl TreeTransaction for LibsqlTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    async fn fetch_row(
        &mut self,
        schema: &TreeSchema,
        id: NodeId,
    ) -> Result<Option<StoredRow>, DatabaseError> {
        let sql = format!("{} WHERE {} = ?", Self::select_columns(schema), schema.id_field);
        let mut rows = self.query_rows(&sql, vec![Value::Integer(id.0)]).await?;
        Ok(rows.pop())
    }

    async fn execute_range_update(
        &mut self,
        schema: &TreeSchema,
        shift: &RangeShift,
    ) -> Result<u64, DatabaseError> {
        self.require_write("Range update")?;

        let column = schema.range_column(shift.field);
        let guard = schema.range_column(shift.threshold_field);
        let sql = format!(
            "UPDATE {} SET {column} = {column} + ? WHERE {guard} >= ?",
            schema.table
        );

        self.conn
            .execute(&sql, (shift.delta, shift.threshold))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to shift {}: {}", column, e))
            })
    }

    async fn insert_row(
        &mut self,
        schema: &TreeSchema,
        row: &NewRow,
    ) -> Result<NodeId, DatabaseError> {
        self.require_write("Insert")?;

        let properties = serde_json::to_string(&row.properties)?;
        let parent_id = row.parent_id.map(NodeId::value);
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?)",
            schema.table,
            schema.id_field,
            schema.parent_field,
            schema.left_field,
            schema.right_field,
            schema.properties_field
        );

        self.conn
            .execute(
                &sql,
                (
                    row.id.map(NodeId::value),
                    parent_id,
                    row.left,
                    row.right,
                    properties,
                ),
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert row: {}", e)))?;

        Ok(match row.id {
            Some(id) => id,
            None => NodeId(self.conn.last_insert_rowid()),
        })
    }

    async fn delete_rows(
        &mut self,
        schema: &TreeSchema,
        lower: i64,
        upper: i64,
    ) -> Result<u64, DatabaseError> {
        self.require_write("Delete")?;

        let sql = format!(
            "DELETE FROM {} WHERE {} >= ? AND {} <= ?",
            schema.table, schema.left_field, schema.right_field
        );
        self.conn
            .execute(&sql, (lower, upper))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete rows: {}", e)))
    }

    async fn scan_ordered(
        &mut self,
        schema: &TreeSchema,
        scan: &RangeScan,
    ) -> Result<Vec<StoredRow>, DatabaseError> {
        let left = &schema.left_field;
        let right = &schema.right_field;

        let (condition, params) = match *scan {
            RangeScan::Within {
                left: lower,
                right: upper,
                inclusive: true,
            } => (
                format!(" WHERE {left} >= ? AND {right} <= ?"),
                vec![Value::Integer(lower), Value::Integer(upper)],
            ),
            RangeScan::Within {
                left: lower,
                right: upper,
                inclusive: false,
            } => (
                format!(" WHERE {left} > ? AND {right} < ?"),
                vec![Value::Integer(lower), Value::Integer(upper)],
            ),
            RangeScan::Enclosing {
                left: lower,
                right: upper,
            } => (
                format!(" WHERE {left} < ? AND {right} > ?"),
                vec![Value::Integer(lower), Value::Integer(upper)],
            ),
            RangeScan::All => (String::new(), Vec::new()),
        };

        let sql = format!(
            "{}{} ORDER BY {left} ASC",
            Self::select_columns(schema),
            condition
        );
        self.query_rows(&sql, params).await
    }

    async fn count_at_positions(
        &mut self,
        schema: &TreeSchema,
        positions: &[i64],
    ) -> Result<u64, DatabaseError> {
        if positions.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; positions.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} IN ({placeholders}) OR {} IN ({placeholders})",
            schema.table, schema.left_field, schema.right_field
        );
        let params: Vec<Value> = positions
            .iter()
            .chain(positions.iter())
            .map(|p| Value::Integer(*p))
            .collect();

        let mut stmt = self.conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare position count: {}", e))
        })?;
        let mut rows = stmt.query(Params::Positional(params)).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to count positions: {}", e))
        })?;

        let count: i64 = match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| DatabaseError::sql_execution(e.to_string()))?,
            None => 0,
        };
        Ok(count as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            if let Err(rollback_err) = self.conn.execute("ROLLBACK", ()).await {
                tracing::warn!(
                    "Rollback failed after commit error '{}': {}",
                    e,
                    rollback_err
                );
            }
            return Err(DatabaseError::transaction_failed(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn.execute("ROLLBACK", ()).await.map_err(|e| {
            DatabaseError::transaction_failed(format!("Failed to roll back transaction: {}", e))
        })?;
        Ok(())
    }
}
