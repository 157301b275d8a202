/// Configuration for the tree index
use crate::db::DEFAULT_BUSY_TIMEOUT_MS;
use crate::models::TreeSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for opening a libsql-backed `TreeIndexStore`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeIndexConfig {
    /// Database file, created together with its parent directories
    pub database_path: PathBuf,

    /// Table and column names of the hierarchy
    pub schema: TreeSchema,

    /// How long a connection waits on a locked database (milliseconds)
    pub busy_timeout_ms: u64,

    /// Check the whole table inside every mutation before committing
    pub verify_mutations: bool,
}

impl Default for TreeIndexConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/tree.db"),
            schema: TreeSchema::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            verify_mutations: false,
        }
    }
}

impl TreeIndexConfig {
    /// Parse a JSON document; missing keys fall back to the defaults
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database_path.as_os_str().is_empty() {
            return Err("database_path cannot be empty".to_string());
        }

        if self.busy_timeout_ms == 0 {
            return Err("busy_timeout_ms must be greater than 0".to_string());
        }

        self.schema.validate().map_err(|e| e.to_string())?;

        Ok(())
    }
}
