//! The two queries the planner repeats for every relationship it follows:
//! projecting referenced-column values out of the ancestor table, and
//! finding the dependent rows whose foreign key matches them.
//!
//! Both run the same batching policy: at or above `batch_threshold` the
//! value set is split into `batch_size` chunks, one query each, results
//! deduplicated; a threshold of 0 forces single-query mode. Individual
//! query failures are logged and degrade to empty results so one broken
//! relationship narrows coverage instead of aborting the run.

use indexmap::IndexSet;
use log::{info, warn};

use crate::catalog::TableCatalog;
use crate::config::CleanupConfig;
use crate::error::CleanupResult;
use crate::executor::QueryExecutor;
use crate::metadata::MetadataService;
use crate::model::{DbColumn, TableKey};
use crate::sql::{build_key_predicate, column_list, EMPTY_PREDICATE};
use crate::value::KeyValue;

/// Distinct tuples of `ancestor_columns` for the ancestor rows whose
/// primary key is in `pending_ids`.
///
/// The projection step matters: a foreign key may reference a unique key
/// other than (or a subset or reordering of) the table's primary key, so
/// pending PK values cannot be matched against the dependent table
/// directly.
pub fn referenced_column_values<E, M>(
    executor: &mut E,
    catalog: &mut TableCatalog,
    metadata: &mut M,
    ancestor: &TableKey,
    pending_ids: &IndexSet<KeyValue>,
    ancestor_columns: &[DbColumn],
    config: &CleanupConfig,
) -> CleanupResult<Vec<KeyValue>>
where
    E: QueryExecutor,
    M: MetadataService,
{
    let Some(pk) = catalog.ensure_primary_key(metadata, ancestor)? else {
        warn!("No primary key found for {}", ancestor.qualified());
        return Ok(Vec::new());
    };
    if pending_ids.is_empty() {
        return Ok(Vec::new());
    }

    let projection = column_list(ancestor_columns);
    let ids: Vec<KeyValue> = pending_ids.iter().cloned().collect();

    let batched = config.batching_enabled() && ids.len() >= config.batch_threshold;
    let chunk_size = if batched {
        config.batch_size.max(1)
    } else {
        ids.len()
    };
    if batched {
        info!("Using batched processing for {} IDs", ids.len());
    }

    // order-preserving dedup across chunks
    let mut results: IndexSet<KeyValue> = IndexSet::new();
    for chunk in ids.chunks(chunk_size) {
        let predicate = build_key_predicate(&pk.columns, chunk);
        let sql = format!(
            "SELECT DISTINCT {} FROM {} WHERE {}",
            projection,
            ancestor.bracketed(),
            predicate
        );
        match executor.query(&sql) {
            Ok(rows) => results.extend(rows.into_iter().map(KeyValue::from_row)),
            Err(e) => warn!("Error getting referenced values: {e}"),
        }
    }

    Ok(results.into_iter().collect())
}

/// Distinct primary-key values of dependent rows whose foreign-key columns
/// match any of the projected `referenced_values`.
pub fn child_primary_keys<E, M>(
    executor: &mut E,
    catalog: &mut TableCatalog,
    metadata: &mut M,
    dependent: &TableKey,
    dependent_columns: &[DbColumn],
    referenced_values: &[KeyValue],
    config: &CleanupConfig,
) -> CleanupResult<IndexSet<KeyValue>>
where
    E: QueryExecutor,
    M: MetadataService,
{
    let Some(pk) = catalog.ensure_primary_key(metadata, dependent)? else {
        warn!("No primary key found for {}", dependent.qualified());
        return Ok(IndexSet::new());
    };
    if referenced_values.is_empty() {
        return Ok(IndexSet::new());
    }

    let pk_select = column_list(&pk.columns);

    let batched = config.batching_enabled() && referenced_values.len() >= config.batch_threshold;
    let chunk_size = if batched {
        config.batch_size.max(1)
    } else {
        referenced_values.len()
    };
    if batched {
        info!(
            "Using batched child processing for {} values",
            referenced_values.len()
        );
    }

    let mut child_pk_values: IndexSet<KeyValue> = IndexSet::new();
    for chunk in referenced_values.chunks(chunk_size) {
        let predicate = build_key_predicate(dependent_columns, chunk);
        if predicate == EMPTY_PREDICATE {
            warn!("No valid WHERE conditions generated");
            continue;
        }
        let sql = format!(
            "SELECT DISTINCT {} FROM {} WHERE {}",
            pk_select,
            dependent.bracketed(),
            predicate
        );
        match executor.query(&sql) {
            Ok(rows) => child_pk_values.extend(rows.into_iter().map(KeyValue::from_row)),
            Err(e) => warn!("Error finding child records: {e}"),
        }
    }

    Ok(child_pk_values)
}
