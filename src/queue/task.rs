use indexmap::IndexSet;

use crate::model::TableKey;
use crate::value::KeyValue;

/// Status of a table in the cascade processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
}

/// One table's pending cascade work: the primary-key values found so far
/// and how far from the root it was reached.
///
/// Legal status transitions are `Pending -> Processing -> Completed`, plus
/// the single backward edge `Completed -> Pending` taken when a merge
/// actually grows the ID set (see [`super::ProcessingQueue::add_task`]).
#[derive(Debug, Clone)]
pub struct CascadeTask {
    pub table: TableKey,
    pub ids: IndexSet<KeyValue>,
    pub status: ProcessingStatus,
    pub level: u32,
}

impl CascadeTask {
    pub fn new(table: TableKey, ids: IndexSet<KeyValue>, level: u32) -> Self {
        Self {
            table,
            ids,
            status: ProcessingStatus::Pending,
            level,
        }
    }

    /// `schema.table` key used in logs and operation maps
    pub fn table_key(&self) -> String {
        self.table.qualified()
    }
}
