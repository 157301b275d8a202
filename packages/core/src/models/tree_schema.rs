//! Tree Schema Capability
//!
//! A `TreeSchema` names the table and columns a hierarchy lives in. The
//! nested-set algorithm never looks at anything else, so categories, org
//! units and any other hierarchy share one implementation by passing a
//! different schema value.
//!
//! Column names are formatted into SQL by the libsql store, so every
//! identifier is validated before use.

use crate::db::{DatabaseError, RangeField};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Pattern every table and column name must match
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Default column holding the row identifier
pub const ID_FIELD_NAME: &str = "ID";

/// Default column holding the parent row identifier
pub const PARENT_FIELD_NAME: &str = "parentNodeID";

/// Default column holding the left traversal value
pub const LEFT_FIELD_NAME: &str = "lft";

/// Default column holding the right traversal value
pub const RIGHT_FIELD_NAME: &str = "rgt";

/// Default column holding the JSON record payload
pub const PROPERTIES_FIELD_NAME: &str = "properties";

/// Table and column names for one hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSchema {
    pub table: String,
    pub id_field: String,
    pub parent_field: String,
    pub left_field: String,
    pub right_field: String,
    pub properties_field: String,
}

impl Default for TreeSchema {
    fn default() -> Self {
        Self::new("tree_nodes")
    }
}

impl TreeSchema {
    /// Schema for `table` using the default column names
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_field: ID_FIELD_NAME.to_string(),
            parent_field: PARENT_FIELD_NAME.to_string(),
            left_field: LEFT_FIELD_NAME.to_string(),
            right_field: RIGHT_FIELD_NAME.to_string(),
            properties_field: PROPERTIES_FIELD_NAME.to_string(),
        }
    }

    /// Override the range column names
    pub fn with_range_fields(
        mut self,
        left_field: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        self.left_field = left_field.into();
        self.right_field = right_field.into();
        self
    }

    /// Override the parent column name
    pub fn with_parent_field(mut self, parent_field: impl Into<String>) -> Self {
        self.parent_field = parent_field.into();
        self
    }

    /// Column name for a range field
    pub fn range_column(&self, field: RangeField) -> &str {
        match field {
            RangeField::Left => &self.left_field,
            RangeField::Right => &self.right_field,
        }
    }

    /// Validate every identifier and reject duplicate column names
    pub fn validate(&self) -> Result<(), DatabaseError> {
        let identifiers = [
            &self.table,
            &self.id_field,
            &self.parent_field,
            &self.left_field,
            &self.right_field,
            &self.properties_field,
        ];

        for name in identifiers {
            if !is_valid_identifier(name) {
                return Err(DatabaseError::invalid_identifier(name.as_str()));
            }
        }

        let columns = &identifiers[1..];
        for (i, name) in columns.iter().enumerate() {
            if columns[i + 1..]
                .iter()
                .any(|other| other.eq_ignore_ascii_case(name))
            {
                return Err(DatabaseError::invalid_identifier(format!(
                    "{} (duplicate column)",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn is_valid_identifier(name: &str) -> bool {
    static IDENT_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let ident_regex = IDENT_REGEX.get_or_init(|| Regex::new(IDENTIFIER_PATTERN));

    matches!(ident_regex, Ok(re) if re.is_match(name))
}
