//! SQL fragment construction.
//!
//! Everything the planner sends to the database is assembled here from
//! validated identifiers and [`SqlValue`] literals:
//!
//! - `IN (...)` lists for single-column keys
//! - OR-joined `([a] = x AND [b] = y)` groups for composite keys
//! - the always-false `1=0` guard when a predicate would otherwise be empty
//!
//! Large value sets are split by the callers into chunks (see
//! `cascade::lookup`); the fragments built here never grow beyond one
//! chunk's worth of values.

use crate::model::DbColumn;
use crate::value::{KeyValue, SqlValue};

/// Rendered when no usable condition exists, so a malformed value set can
/// never widen into an unrestricted statement.
pub const EMPTY_PREDICATE: &str = "1=0";

/// `[a], [b], [c]` projection list
pub fn column_list(columns: &[DbColumn]) -> String {
    columns
        .iter()
        .map(|c| format!("[{}]", c.column_name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma-joined literal list for an `IN (...)` clause.
///
/// NULL renders as the keyword here; callers that need NULL-matching
/// semantics use the equality form instead.
pub fn format_value_list<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a SqlValue>,
{
    values
        .into_iter()
        .map(SqlValue::to_literal)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `[col] = value`, or `[col] IS NULL` for null values
pub fn equality_condition(column: &DbColumn, value: &SqlValue) -> String {
    if value.is_null() {
        format!("[{}] IS NULL", column.column_name)
    } else {
        format!("[{}] = {}", column.column_name, value.to_literal())
    }
}

/// WHERE-clause body matching `columns` against the given key set.
///
/// Single column: an `IN` list over each key's first component. Composite:
/// one parenthesized AND group per key, OR-joined; a key contributing no
/// conditions is skipped, and an empty overall set renders [`EMPTY_PREDICATE`].
pub fn build_key_predicate(columns: &[DbColumn], keys: &[KeyValue]) -> String {
    if columns.is_empty() || keys.is_empty() {
        return EMPTY_PREDICATE.to_string();
    }

    if columns.len() == 1 {
        let list = format_value_list(keys.iter().map(KeyValue::first));
        return format!("[{}] IN ({})", columns[0].column_name, list);
    }

    let mut groups = Vec::with_capacity(keys.len());
    for key in keys {
        let mut conditions = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            // a short tuple contributes what it has
            let Some(value) = key.component(i) else {
                break;
            };
            conditions.push(equality_condition(column, value));
        }
        if !conditions.is_empty() {
            groups.push(format!("({})", conditions.join(" AND ")));
        }
    }

    if groups.is_empty() {
        EMPTY_PREDICATE.to_string()
    } else {
        groups.join(" OR ")
    }
}
