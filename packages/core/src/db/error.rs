//! Database Error Types
//!
//! This module defines error types for the storage collaborator, covering
//! connection, schema, transaction, and statement failures.

use std::path::PathBuf;
use thiserror::Error;

/// Storage operation errors
///
/// Covers every failure a `TreeStore` implementation can report. Tree
/// invariant failures are reported by the service layer instead.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Table or column name that is unsafe to format into SQL
    #[error("Invalid identifier: {name}")]
    InvalidIdentifier { name: String },

    /// Transaction could not be started, finished, or used
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },

    /// Properties payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create an invalid identifier error
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier { name: name.into() }
    }

    /// Create a transaction failed error
    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }
}
