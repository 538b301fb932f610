//! Script generation and transactional execution.
//!
//! The emitted script is plain text a DBA can hand-edit and replay:
//! `--` comment lines for metadata and batch markers, one
//! `BEGIN TRANSACTION;` at the top, DELETEs in deletion order, and
//! commented-out `COMMIT`/`ROLLBACK` lines at the end so the final choice
//! stays manual. Execute mode drives the same statements through a real
//! transaction with operator confirmation on both ends.

use chrono::Local;
use indexmap::{IndexMap, IndexSet};
use log::{error, info};

use crate::config::CleanupConfig;
use crate::error::{CleanupError, CleanupResult};
use crate::executor::QueryExecutor;
use crate::model::{DbTable, TableKey};
use crate::sql::build_key_predicate;
use crate::value::KeyValue;

/// Final, queue-independent result for one table: the rows to delete,
/// always addressed by primary key.
#[derive(Debug, Clone)]
pub struct CleanupOperation {
    pub table: DbTable,
    pub ids: IndexSet<KeyValue>,
}

impl CleanupOperation {
    pub fn new(table: DbTable, ids: IndexSet<KeyValue>) -> Self {
        Self { table, ids }
    }

    pub fn record_count(&self) -> usize {
        self.ids.len()
    }

    /// One DELETE covering the whole ID set; `None` when there is nothing
    /// to delete or the table has no primary key to address rows by.
    pub fn generate_delete_sql(&self) -> Option<String> {
        let pk = self.table.primary_key.as_ref()?;
        if self.ids.is_empty() || pk.columns.is_empty() {
            return None;
        }
        let keys: Vec<KeyValue> = self.ids.iter().cloned().collect();
        Some(format!(
            "DELETE FROM {} WHERE {}",
            self.table.full_table_name(),
            build_key_predicate(&pk.columns, &keys)
        ))
    }

    /// The same deletion split into chunks of `batch_size` IDs.
    pub fn generate_batched_delete_sql(&self, batch_size: usize) -> Vec<String> {
        let Some(pk) = self.table.primary_key.as_ref() else {
            return Vec::new();
        };
        if self.ids.is_empty() || pk.columns.is_empty() || batch_size == 0 {
            return Vec::new();
        }
        let keys: Vec<KeyValue> = self.ids.iter().cloned().collect();
        keys.chunks(batch_size)
            .map(|chunk| {
                format!(
                    "DELETE FROM {} WHERE {}",
                    self.table.full_table_name(),
                    build_key_predicate(&pk.columns, chunk)
                )
            })
            .collect()
    }

    pub fn should_use_batching(&self, threshold: usize) -> bool {
        threshold > 0 && self.ids.len() >= threshold
    }
}

/// Render the full cleanup script.
pub fn generate_cleanup_script(
    operations: &IndexMap<TableKey, CleanupOperation>,
    deletion_order: &[TableKey],
    config: &CleanupConfig,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("-- Data Cleanup Script".to_string());
    lines.push(format!("-- Connection: {}", config.server));
    lines.push(format!("-- Database: {}", config.database));
    lines.push(format!(
        "-- Generated: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    if config.batching_enabled() {
        lines.push("-- Batch Processing: Enabled".to_string());
        lines.push(format!("-- Batch Size: {} records", config.batch_size));
        lines.push(format!(
            "-- Batch Threshold: {} records",
            config.batch_threshold
        ));
    } else {
        lines.push("-- Batch Processing: Disabled".to_string());
    }

    lines.push(String::new());
    lines.push("BEGIN TRANSACTION;".to_string());
    lines.push(String::new());

    let mut total_records = 0;
    let mut batched_tables = 0;

    for table in deletion_order {
        let Some(operation) = operations.get(table) else {
            continue;
        };
        if operation.ids.is_empty() {
            continue;
        }

        let record_count = operation.record_count();
        total_records += record_count;

        lines.push(format!("-- Table: {}", table.qualified()));
        lines.push(format!("-- Records to delete: {record_count}"));

        if operation.should_use_batching(config.batch_threshold) {
            batched_tables += 1;
            let batch_count = record_count.div_ceil(config.batch_size);
            lines.push(format!(
                "-- Using {} batches of max {} records each",
                batch_count, config.batch_size
            ));

            for (i, stmt) in operation
                .generate_batched_delete_sql(config.batch_size)
                .iter()
                .enumerate()
            {
                let start_idx = i * config.batch_size + 1;
                let end_idx = ((i + 1) * config.batch_size).min(record_count);
                lines.push(format!(
                    "-- Batch {}/{}: records {}-{}",
                    i + 1,
                    batch_count,
                    start_idx,
                    end_idx
                ));
                lines.push(format!("{stmt};"));
            }
        } else if let Some(stmt) = operation.generate_delete_sql() {
            lines.push(format!("{stmt};"));
        }

        lines.push(String::new());
    }

    lines.push(format!(
        "-- Script Summary: {} records across {} tables",
        total_records,
        operations.len()
    ));
    if batched_tables > 0 {
        lines.push(format!("-- {batched_tables} tables processed with batching"));
    }

    lines.push(String::new());
    lines.push("-- COMMIT TRANSACTION;".to_string());
    lines.push("-- ROLLBACK TRANSACTION;".to_string());

    lines.join("\n")
}

/// Confirmation points handed to the operator during execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPrompt {
    /// "Are you sure you want to execute the cleanup operations?"
    ExecuteCleanup,
    /// "Commit the transaction?"
    CommitTransaction,
}

#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    pub rows_deleted: IndexMap<TableKey, u64>,
    pub committed: bool,
    pub cancelled: bool,
}

/// Run the DELETEs inside one transaction.
///
/// The confirm hook is consulted before anything runs and again before the
/// commit; declining either leaves the database untouched. Any statement
/// failure rolls the whole transaction back; partial commits cannot
/// happen.
pub fn execute_cleanup<E: QueryExecutor>(
    executor: &mut E,
    operations: &IndexMap<TableKey, CleanupOperation>,
    deletion_order: &[TableKey],
    confirm: &mut dyn FnMut(ConfirmPrompt) -> bool,
) -> CleanupResult<ExecutionOutcome> {
    let mut outcome = ExecutionOutcome::default();

    if !confirm(ConfirmPrompt::ExecuteCleanup) {
        info!("Execution cancelled");
        outcome.cancelled = true;
        return Ok(outcome);
    }

    info!("Executing cleanup operations...");
    executor.execute("BEGIN TRANSACTION")?;

    for table in deletion_order {
        let Some(operation) = operations.get(table) else {
            continue;
        };
        let Some(delete_sql) = operation.generate_delete_sql() else {
            continue;
        };

        info!("Deleting from {}...", table.qualified());
        match executor.execute(&delete_sql) {
            Ok(count) => {
                info!("Deleted {count} rows");
                outcome.rows_deleted.insert(table.clone(), count);
            }
            Err(e) => {
                if let Err(rollback_err) = executor.execute("ROLLBACK TRANSACTION") {
                    error!("Rollback after failure also failed: {rollback_err}");
                }
                return Err(CleanupError::ExecutionFailed {
                    table: table.qualified(),
                    error: e.to_string(),
                });
            }
        }
    }

    if confirm(ConfirmPrompt::CommitTransaction) {
        executor.execute("COMMIT TRANSACTION")?;
        outcome.committed = true;
        info!("Transaction committed");
    } else {
        executor.execute("ROLLBACK TRANSACTION")?;
        info!("Transaction rolled back");
    }

    Ok(outcome)
}
