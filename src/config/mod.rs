use serde::{Deserialize, Serialize};

use crate::error::{CleanupError, CleanupResult};
use crate::model::TableKey;
use crate::validation::{validate_root_query, validate_sql_identifier};

/// Maximum iterations of the cascade planner loop
/// Prevents infinite work when relationship discovery produces an unanticipated cycle
pub const MAX_CASCADE_ITERATIONS: usize = 1000;

/// Maximum passes when rebuilding table levels after relationship augmentation
pub const MAX_LEVEL_REBUILD_PASSES: usize = 10;

/// Default number of records per batched query/statement
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default record count at which batching kicks in (0 disables batching)
pub const DEFAULT_BATCH_THRESHOLD: usize = 1000;

fn default_schema() -> String {
    "dbo".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_batch_threshold() -> usize {
    DEFAULT_BATCH_THRESHOLD
}

/// What to do with the computed cleanup plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Generate the script and report, but run no DELETEs
    #[default]
    Summary,
    /// Run the DELETEs inside a transaction, with operator confirmation
    Execute,
}

/// Configuration for one cleanup run.
///
/// Loading (TOML, environment) is the caller's concern; this crate only
/// consumes the deserialized values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Server identity, used for the script header
    pub server: String,

    /// Target database name
    pub database: String,

    /// Schema of the root table
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Root table whose rows are targeted for deletion
    pub table: String,

    /// SELECT returning the primary-key values of the rows to remove
    pub query_of_data_to_remove: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,

    #[serde(default)]
    pub mode: CleanupMode,
}

impl CleanupConfig {
    /// Check required values before any query is issued.
    pub fn validate(&self) -> CleanupResult<()> {
        if self.server.is_empty() {
            return Err(CleanupError::ConfigurationError {
                setting: "server".to_string(),
                reason: "Connection server is not defined in config".to_string(),
            });
        }
        if self.database.is_empty() {
            return Err(CleanupError::ConfigurationError {
                setting: "database".to_string(),
                reason: "Database is not defined in config".to_string(),
            });
        }
        if self.table.is_empty() {
            return Err(CleanupError::ConfigurationError {
                setting: "table".to_string(),
                reason: "Table for cleanup is not defined in config".to_string(),
            });
        }
        if self.query_of_data_to_remove.is_empty() {
            return Err(CleanupError::ConfigurationError {
                setting: "query_of_data_to_remove".to_string(),
                reason: "Query for data to remove is not defined in config".to_string(),
            });
        }
        if self.batch_threshold > 0 && self.batch_size == 0 {
            return Err(CleanupError::ConfigurationError {
                setting: "batch_size".to_string(),
                reason: "Batch size must be positive when batching is enabled".to_string(),
            });
        }

        validate_sql_identifier(&self.schema, "schema")?;
        validate_sql_identifier(&self.table, "table")?;
        validate_root_query(&self.query_of_data_to_remove)?;

        Ok(())
    }

    pub fn root_table(&self) -> TableKey {
        TableKey::new(&self.schema, &self.table)
    }

    /// Batch threshold 0 disables batching entirely, forcing single-query
    /// mode regardless of set size.
    pub fn batching_enabled(&self) -> bool {
        self.batch_threshold > 0
    }
}
