//! Run-owned metadata cache.
//!
//! Every component reads table metadata through this cache instead of
//! holding shared mutable table records. Entries are append-only for the
//! life of one cascade run: columns and keys are filled in on first demand
//! and never removed, so a table reached through several paths always
//! resolves to the same accumulated record.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::CleanupResult;
use crate::metadata::MetadataService;
use crate::model::{DbColumn, DbTable, ForeignKey, PrimaryKey, TableKey};

#[derive(Debug, Default)]
pub struct TableCatalog {
    tables: IndexMap<TableKey, DbTable>,
    columns_loaded: HashSet<TableKey>,
    pk_loaded: HashSet<TableKey>,
    fks_loaded: HashSet<TableKey>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached record for `key`, created empty on first access.
    pub fn entry(&mut self, key: &TableKey) -> &mut DbTable {
        self.tables
            .entry(key.clone())
            .or_insert_with(|| DbTable::new(&key.schema, &key.table))
    }

    pub fn get(&self, key: &TableKey) -> Option<&DbTable> {
        self.tables.get(key)
    }

    /// Immutable snapshot of a record, an empty one when never loaded.
    pub fn snapshot(&self, key: &TableKey) -> DbTable {
        self.tables
            .get(key)
            .cloned()
            .unwrap_or_else(|| DbTable::new(&key.schema, &key.table))
    }

    pub fn tables(&self) -> impl Iterator<Item = (&TableKey, &DbTable)> {
        self.tables.iter()
    }

    /// Columns for `key`, consulting the metadata service once.
    pub fn ensure_columns<M: MetadataService>(
        &mut self,
        metadata: &mut M,
        key: &TableKey,
    ) -> CleanupResult<Vec<DbColumn>> {
        if !self.columns_loaded.contains(key) {
            let columns = metadata.get_columns(key)?;
            let entry = self.entry(key);
            if entry.all_columns.is_empty() {
                entry.all_columns = columns;
            }
            self.columns_loaded.insert(key.clone());
        }
        Ok(self.entry(key).all_columns.clone())
    }

    /// Primary key for `key`, consulting the metadata service once.
    /// `None` is a valid, cached answer (heap tables exist).
    pub fn ensure_primary_key<M: MetadataService>(
        &mut self,
        metadata: &mut M,
        key: &TableKey,
    ) -> CleanupResult<Option<PrimaryKey>> {
        if !self.pk_loaded.contains(key) {
            let pk = metadata.get_primary_key(key)?;
            let entry = self.entry(key);
            if entry.primary_key.is_none() {
                entry.primary_key = pk;
            }
            self.pk_loaded.insert(key.clone());
        }
        Ok(self.entry(key).primary_key.clone())
    }

    /// Foreign keys held by `key`, consulting the metadata service once.
    /// Newly discovered constraints merge into the record; existing entries
    /// are never replaced.
    pub fn ensure_foreign_keys<M: MetadataService>(
        &mut self,
        metadata: &mut M,
        key: &TableKey,
    ) -> CleanupResult<IndexMap<String, ForeignKey>> {
        if !self.fks_loaded.contains(key) {
            let fks = metadata.get_foreign_keys(key)?;
            let entry = self.entry(key);
            for (name, fk) in fks {
                entry.foreign_keys.entry(name).or_insert(fk);
            }
            self.fks_loaded.insert(key.clone());
        }
        Ok(self.entry(key).foreign_keys.clone())
    }
}
