//! Database Connection Management
//!
//! This module provides the libsql database handle used by
//! [`LibsqlTreeStore`](crate::db::LibsqlTreeStore), plus the DDL for
//! nested-set tables.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf, creating parent directories
//! - **WAL mode**: Readers keep a snapshot while a writer holds the lock
//! - **Busy timeout**: Concurrent writers wait instead of failing with `SQLITE_BUSY`
//! - **No migrations**: Tables are created with `CREATE TABLE IF NOT EXISTS`
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** It applies the
//! busy timeout and enables foreign keys on the new connection.
//!
//! ```no_run
//! # use nestedset_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/tree.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use crate::models::TreeSchema;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Busy timeout applied to every connection unless configured otherwise
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Database service for managing the libsql connection and tree tables
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    /// Busy timeout applied to each new connection
    pub busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` with the default busy timeout
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - WAL mode cannot be enabled
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
    }

    /// Open (or create) the database with an explicit busy timeout
    pub async fn with_busy_timeout(
        db_path: PathBuf,
        busy_timeout_ms: u64,
    ) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms,
        };

        service.initialize().await?;
        tracing::debug!("Opened tree database at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Database-wide settings
    ///
    /// `journal_mode` persists in the file; the per-connection settings are
    /// applied in `connect_with_timeout()`.
    async fn initialize(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await
            .map_err(|e| DatabaseError::initialization_failed(e.to_string()))?;
        Ok(())
    }

    /// Create the nested-set table and its range indexes for `schema`
    ///
    /// Idempotent. The range columns carry no UNIQUE constraint because bulk
    /// shifts pass through transient duplicates within one statement. Row ids
    /// are never handed out twice, even after the highest row is deleted.
    pub async fn ensure_tree_table(&self, schema: &TreeSchema) -> Result<(), DatabaseError> {
        schema.validate()?;
        let conn = self.connect_with_timeout().await?;

        let TreeSchema {
            table,
            id_field,
            parent_field,
            left_field,
            right_field,
            properties_field,
        } = schema;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    {id_field} INTEGER PRIMARY KEY AUTOINCREMENT,
                    {parent_field} INTEGER REFERENCES {table}({id_field}),
                    {left_field} INTEGER NOT NULL,
                    {right_field} INTEGER NOT NULL,
                    {properties_field} TEXT NOT NULL DEFAULT '{{}}',
                    CHECK ({left_field} < {right_field})
                )"
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create table {}: {}", table, e))
        })?;

        let indexes = [
            ("lft", left_field),
            ("rgt", right_field),
            ("parent", parent_field),
        ];
        for (suffix, column) in indexes {
            conn.execute(
                &format!("CREATE INDEX IF NOT EXISTS idx_{table}_{suffix} ON {table}({column})"),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index on {}.{}: {}",
                    table, column, e
                ))
            })?;
        }

        tracing::debug!("Tree table '{}' ready", table);
        Ok(())
    }

    /// Get a synchronous connection to the database
    ///
    /// **⚠️ WARNING**: Only use this in synchronous, single-threaded contexts.
    /// In async functions use `connect_with_timeout()` instead.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout and foreign keys configured
    ///
    /// **✅ RECOMMENDED**: Use this for all async functions.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms),
        )
        .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Flush the WAL into the main database file
    pub async fn checkpoint(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db_service = DatabaseService::new(db_path.clone()).await.unwrap();

        assert_eq!(db_service.db_path, db_path);
        assert_eq!(db_service.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_tree_table_created() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db_service = DatabaseService::new(db_path).await.unwrap();
        db_service
            .ensure_tree_table(&TreeSchema::new("catalog"))
            .await
            .unwrap();

        let conn = db_service.connect().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='catalog'")
            .await
            .unwrap();
        let mut rows = stmt.query(()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let table_name: String = row.get(0).unwrap();
        assert_eq!(table_name, "catalog");
    }

    #[tokio::test]
    async fn test_range_indexes_created() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db_service = DatabaseService::new(db_path).await.unwrap();
        db_service
            .ensure_tree_table(&TreeSchema::new("catalog"))
            .await
            .unwrap();

        let conn = db_service.connect().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .await
            .unwrap();
        let mut rows = stmt.query(()).await.unwrap();

        let mut index_names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            let name: String = row.get(0).unwrap();
            index_names.push(name);
        }

        assert!(index_names.contains(&"idx_catalog_lft".to_string()));
        assert!(index_names.contains(&"idx_catalog_rgt".to_string()));
        assert!(index_names.contains(&"idx_catalog_parent".to_string()));
    }

    #[tokio::test]
    async fn test_wal_mode_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db_service = DatabaseService::new(db_path).await.unwrap();
        let conn = db_service.connect().unwrap();

        let mut stmt = conn.prepare("PRAGMA journal_mode").await.unwrap();
        let mut rows = stmt.query(()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let mode: String = row.get(0).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_parent_directory_creation() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("dirs").join("test.db");

        let _db_service = DatabaseService::new(nested_path.clone()).await.unwrap();

        assert!(nested_path.exists());
    }

    #[tokio::test]
    async fn test_idempotent_table_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let schema = TreeSchema::new("org_units");

        let db_service = DatabaseService::new(db_path.clone()).await.unwrap();
        db_service.ensure_tree_table(&schema).await.unwrap();
        db_service.ensure_tree_table(&schema).await.unwrap();

        let reopened = DatabaseService::new(db_path).await.unwrap();
        reopened.ensure_tree_table(&schema).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_invalid_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db_service = DatabaseService::new(db_path).await.unwrap();
        let result = db_service
            .ensure_tree_table(&TreeSchema::new("bad name"))
            .await;
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidIdentifier { .. })
        ));
    }
}
