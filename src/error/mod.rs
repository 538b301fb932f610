use std::fmt;

/// Main error type for the cleanup planner
#[derive(Debug, Clone, PartialEq)]
pub enum CleanupError {
    // ============ Configuration Errors ============
    /// Required configuration value missing or invalid
    ConfigurationError {
        setting: String,
        reason: String,
    },

    /// The root query must be a single SELECT statement
    InvalidRootQuery {
        query: String,
        reason: String,
    },

    // ============ Model Errors ============
    /// Foreign-key column lists differ in length
    ColumnCountMismatch {
        constraint: String,
        dependent_columns: usize,
        ancestor_columns: usize,
    },

    /// A table involved in the cascade has no discoverable primary key
    MissingPrimaryKey {
        table: String,
    },

    // ============ Validation Errors ============
    /// Input failed identifier validation
    InvalidIdentifier {
        parameter: String,
        value: String,
        reason: String,
    },

    /// Input contains characters that could alter generated SQL
    SecurityViolation {
        parameter: String,
        value: String,
        reason: String,
    },

    // ============ Metadata and Query Errors ============
    /// A catalog lookup failed for a table
    MetadataLookupFailed {
        table: String,
        operation: String,
        reason: String,
    },

    /// A SQL query failed against the target database
    QueryFailed {
        query: String,
        error: String,
    },

    // ============ Execution Errors ============
    /// A DELETE failed during execution; the transaction was rolled back
    ExecutionFailed {
        table: String,
        error: String,
    },

    /// Serialization/deserialization failed
    SerializationError {
        message: String,
    },
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CleanupError::*;
        match self {
            ConfigurationError { setting, reason } => {
                write!(f, "Configuration error for '{}': {}", setting, reason)
            }
            InvalidRootQuery { query, reason } => {
                write!(f, "Invalid root query: {}\nQuery: {}", reason,
                       if query.len() > 100 { &query[..100] } else { query })
            }
            ColumnCountMismatch { constraint, dependent_columns, ancestor_columns } => {
                write!(
                    f,
                    "Foreign key '{}' has {} dependent column(s) but {} referenced column(s)",
                    constraint, dependent_columns, ancestor_columns
                )
            }
            MissingPrimaryKey { table } => {
                write!(f, "Table '{}' has no primary key", table)
            }
            InvalidIdentifier { parameter, value, reason } => {
                write!(f, "Invalid identifier for '{}' (value: {}): {}", parameter, value, reason)
            }
            SecurityViolation { parameter, value, reason } => {
                write!(f, "Rejected unsafe value for '{}' (value: {}): {}", parameter, value, reason)
            }
            MetadataLookupFailed { table, operation, reason } => {
                write!(f, "Metadata operation '{}' failed for '{}': {}", operation, table, reason)
            }
            QueryFailed { query, error } => {
                write!(f, "Query failed: {}\nQuery: {}", error,
                       if query.len() > 100 { &query[..100] } else { query })
            }
            ExecutionFailed { table, error } => {
                write!(
                    f,
                    "Error deleting from '{}'. Transaction rolled back: {}",
                    table, error
                )
            }
            SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for CleanupError {}

/// Result type for cleanup operations
pub type CleanupResult<T> = Result<T, CleanupError>;

/// Convert serde_json::Error to CleanupError
impl From<serde_json::Error> for CleanupError {
    fn from(e: serde_json::Error) -> Self {
        CleanupError::SerializationError {
            message: format!("JSON serialization error: {}", e),
        }
    }
}
