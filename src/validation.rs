//! Input validation.
//!
//! Every identifier and the operator-supplied root query end up
//! interpolated into generated SQL, so they are whitelisted here before any
//! statement is built. Validation failures are fatal configuration errors,
//! never silently repaired.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CleanupError, CleanupResult};

/// SQL Server caps identifiers (sysname) at 128 characters.
const MAX_IDENTIFIER_LEN: usize = 128;

static SELECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*SELECT\b").expect("static regex")
});

/// Validate a schema, table or column name before it is bracket-quoted
/// into a statement.
///
/// Allows alphanumerics and underscore; rejects everything that could
/// close a bracket or smuggle in a second statement.
pub fn validate_sql_identifier(identifier: &str, param_name: &str) -> CleanupResult<()> {
    if identifier.is_empty() {
        return Err(CleanupError::InvalidIdentifier {
            parameter: param_name.to_string(),
            value: identifier.to_string(),
            reason: "Identifier cannot be empty".to_string(),
        });
    }

    let dangerous_chars = [';', '\'', '"', '[', ']', '-', '/', '*', '\\', '\0'];
    for &ch in &dangerous_chars {
        if identifier.contains(ch) {
            return Err(CleanupError::SecurityViolation {
                parameter: param_name.to_string(),
                value: sanitize_for_logging(identifier),
                reason: format!("Identifier contains dangerous character: '{}'", ch),
            });
        }
    }

    if !identifier.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(CleanupError::InvalidIdentifier {
            parameter: param_name.to_string(),
            value: sanitize_for_logging(identifier),
            reason: "Identifier must contain only alphanumeric characters and underscores"
                .to_string(),
        });
    }

    if identifier
        .chars()
        .next()
        .is_some_and(|c| c.is_numeric())
    {
        return Err(CleanupError::InvalidIdentifier {
            parameter: param_name.to_string(),
            value: sanitize_for_logging(identifier),
            reason: "Identifier cannot start with a digit".to_string(),
        });
    }

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(CleanupError::InvalidIdentifier {
            parameter: param_name.to_string(),
            value: format!("{}... ({} chars)", &identifier[..20], identifier.len()),
            reason: format!("Identifier too long (max {MAX_IDENTIFIER_LEN} characters)"),
        });
    }

    Ok(())
}

/// The configured root query is run verbatim, so it must be a single
/// SELECT statement.
pub fn validate_root_query(sql: &str) -> CleanupResult<()> {
    if !SELECT_RE.is_match(sql) {
        return Err(CleanupError::InvalidRootQuery {
            query: sql.to_string(),
            reason: "Expected a SELECT statement".to_string(),
        });
    }

    // allow one trailing semicolon, nothing after it
    let trimmed = sql.trim_end();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
    if body.contains(';') {
        return Err(CleanupError::InvalidRootQuery {
            query: sql.to_string(),
            reason: "Multiple statements are not allowed".to_string(),
        });
    }

    Ok(())
}

/// Truncate an untrusted value before it lands in a log line or error
/// message.
fn sanitize_for_logging(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .take(40)
        .map(|c| if c.is_control() { '?' } else { c })
        .collect();
    if value.len() > 40 {
        format!("{cleaned}...")
    } else {
        cleaned
    }
}
