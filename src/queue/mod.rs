//! The cascade work-list.
//!
//! One [`CascadeTask`] per distinct table, ever. Reaching a table a second
//! time merges the new IDs into the existing task (set union) instead of
//! creating a duplicate, which is what keeps diamond-shaped schemas from
//! processing the same rows once per path. A completed task that actually
//! gains new IDs through a merge reopens, so a table reached late through a
//! second path is fully reprocessed.
//!
//! Pending work is indexed by `(level, arrival)` so the planner always
//! takes the shallowest pending table next: breadth-first, without the
//! rescan-and-sort over the full task list.

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};

use crate::catalog::TableCatalog;
use crate::model::TableKey;
use crate::script::CleanupOperation;
use crate::value::KeyValue;

mod task;

pub use task::{CascadeTask, ProcessingStatus};

#[derive(Debug, Default)]
pub struct ProcessingQueue {
    tasks: IndexMap<TableKey, CascadeTask>,
    /// (level, arrival sequence, table) for every Pending task
    pending: BTreeSet<(u32, usize, TableKey)>,
    /// arrival order per table, fixed at first sight
    sequence: IndexMap<TableKey, usize>,
    completed_tables: IndexSet<TableKey>,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge-or-create the task for `table` and return it.
    ///
    /// Existing task: IDs are unioned, the level is raised to
    /// `max(existing, new)`, and a Completed task whose ID set actually
    /// grew goes back to Pending. A merge that adds nothing changes
    /// nothing.
    pub fn add_task<I>(&mut self, table: TableKey, ids: I, level: u32) -> &CascadeTask
    where
        I: IntoIterator<Item = KeyValue>,
    {
        let arrival = self.sequence.len();
        let seq = *self.sequence.entry(table.clone()).or_insert(arrival);

        if let Some(task) = self.tasks.get_mut(&table) {
            let old_count = task.ids.len();
            task.ids.extend(ids);
            let grew = task.ids.len() > old_count;

            let new_level = task.level.max(level);
            if task.status == ProcessingStatus::Pending && new_level != task.level {
                self.pending.remove(&(task.level, seq, table.clone()));
                self.pending.insert((new_level, seq, table.clone()));
            }
            task.level = new_level;

            if task.status == ProcessingStatus::Completed && grew {
                task.status = ProcessingStatus::Pending;
                self.completed_tables.shift_remove(&table);
                self.pending.insert((task.level, seq, table.clone()));
            }
        } else {
            let task = CascadeTask::new(table.clone(), ids.into_iter().collect(), level);
            self.pending.insert((level, seq, table.clone()));
            self.tasks.insert(table.clone(), task);
        }

        &self.tasks[&table]
    }

    /// The pending task with the smallest level; ties go to the table that
    /// arrived first.
    pub fn get_next_task(&self) -> Option<&CascadeTask> {
        self.pending
            .first()
            .and_then(|(_, _, table)| self.tasks.get(table))
    }

    pub fn task(&self, table: &TableKey) -> Option<&CascadeTask> {
        self.tasks.get(table)
    }

    /// No-op when no task exists for `table`.
    pub fn mark_processing(&mut self, table: &TableKey) {
        let Some(seq) = self.sequence.get(table).copied() else {
            return;
        };
        if let Some(task) = self.tasks.get_mut(table) {
            if task.status == ProcessingStatus::Pending {
                self.pending.remove(&(task.level, seq, table.clone()));
            }
            task.status = ProcessingStatus::Processing;
        }
    }

    /// No-op when no task exists for `table`.
    pub fn mark_completed(&mut self, table: &TableKey) {
        let Some(seq) = self.sequence.get(table).copied() else {
            return;
        };
        if let Some(task) = self.tasks.get_mut(table) {
            if task.status == ProcessingStatus::Pending {
                self.pending.remove(&(task.level, seq, table.clone()));
            }
            task.status = ProcessingStatus::Completed;
            self.completed_tables.insert(table.clone());
        }
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Every task that found rows, regardless of status, as a final
    /// cleanup operation. Table metadata is snapshotted from the catalog.
    pub fn all_operations(&self, catalog: &TableCatalog) -> IndexMap<TableKey, CleanupOperation> {
        let mut operations = IndexMap::new();
        for (table, task) in &self.tasks {
            if !task.ids.is_empty() {
                operations.insert(
                    table.clone(),
                    CleanupOperation::new(catalog.snapshot(table), task.ids.clone()),
                );
            }
        }
        operations
    }

    pub fn tasks(&self) -> impl Iterator<Item = &CascadeTask> {
        self.tasks.values()
    }

    pub fn completed_count(&self) -> usize {
        self.completed_tables.len()
    }

    pub fn total_records(&self) -> usize {
        self.tasks.values().map(|t| t.ids.len()).sum()
    }

    pub fn max_level(&self) -> u32 {
        self.tasks.values().map(|t| t.level).max().unwrap_or(0)
    }

    /// One-line status for progress logging
    pub fn summary(&self) -> String {
        let pending = self
            .tasks
            .values()
            .filter(|t| t.status == ProcessingStatus::Pending)
            .count();
        let processing = self
            .tasks
            .values()
            .filter(|t| t.status == ProcessingStatus::Processing)
            .count();
        format!(
            "Tasks: {} pending, {} processing, {} completed. Total records: {}",
            pending,
            processing,
            self.completed_tables.len(),
            self.total_records()
        )
    }
}
