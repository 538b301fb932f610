//! Foreign-key hierarchy: discovered relationships, per-table traversal
//! levels, and the deletion order derived from them.
//!
//! Levels measure the longest discovered dependency distance from the root
//! (root = 0, dependents increase outward). Deleting in descending level
//! order guarantees no row is removed while a discovered dependent still
//! references it, diamond-shaped graphs included.

use indexmap::{IndexMap, IndexSet};
use log::{info, warn};

use crate::catalog::TableCatalog;
use crate::config::MAX_LEVEL_REBUILD_PASSES;
use crate::error::CleanupResult;
use crate::metadata::MetadataService;
use crate::model::{Relationship, TableKey};

#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub root_table: TableKey,
    pub relationships: Vec<Relationship>,
    /// Traversal level per table, root = 0
    pub table_levels: IndexMap<TableKey, u32>,
    /// Discovery path per table, informational only
    pub hierarchy_paths: IndexMap<TableKey, String>,
}

impl Hierarchy {
    pub fn new(root_table: TableKey) -> Self {
        let mut table_levels = IndexMap::new();
        table_levels.insert(root_table.clone(), 0);
        let mut hierarchy_paths = IndexMap::new();
        hierarchy_paths.insert(root_table.clone(), root_table.qualified());
        Self {
            root_table,
            relationships: Vec::new(),
            table_levels,
            hierarchy_paths,
        }
    }

    /// Root plus every table appearing on either side of a relationship,
    /// in first-seen order.
    pub fn involved_tables(&self) -> IndexSet<TableKey> {
        let mut tables = IndexSet::new();
        tables.insert(self.root_table.clone());
        for rel in &self.relationships {
            tables.insert(rel.dependent_table.clone());
            tables.insert(rel.ancestor_table.clone());
        }
        tables
    }

    pub fn level_of(&self, table: &TableKey) -> u32 {
        self.table_levels.get(table).copied().unwrap_or(0)
    }

    /// Tables in deletion order: deepest dependents first, root last.
    /// Ties keep first-seen order, so the result is deterministic for a
    /// given discovery sequence.
    pub fn deletion_order(&self) -> Vec<TableKey> {
        let mut tables: Vec<TableKey> = self.involved_tables().into_iter().collect();
        // stable sort keeps input order within a level
        tables.sort_by_key(|t| std::cmp::Reverse(self.level_of(t)));
        tables
    }

    /// Recompute every table's level as the longest dependency distance
    /// from the root, by fixed-point relaxation over all relationships.
    ///
    /// Runs after augmentation so levels reflect late-discovered
    /// relationships; bounded by [`MAX_LEVEL_REBUILD_PASSES`] against
    /// relationship cycles.
    pub fn rebuild_table_levels(&mut self) {
        self.table_levels.clear();
        self.table_levels.insert(self.root_table.clone(), 0);

        let mut changed = true;
        let mut passes = 0;

        while changed && passes < MAX_LEVEL_REBUILD_PASSES {
            changed = false;
            passes += 1;

            for rel in &self.relationships {
                let Some(&ancestor_level) = self.table_levels.get(&rel.ancestor_table) else {
                    continue;
                };
                let min_dependent_level = ancestor_level + 1;
                let current = self.table_levels.get(&rel.dependent_table).copied();
                if current.is_none() || current.unwrap_or(0) < min_dependent_level {
                    self.table_levels
                        .insert(rel.dependent_table.clone(), min_dependent_level);
                    changed = true;
                }
            }
        }

        if changed {
            warn!(
                "Level rebuild did not converge after {} passes; relationship cycle suspected",
                MAX_LEVEL_REBUILD_PASSES
            );
        }
    }

    fn contains_relationship(&self, name: &str, dependent: &TableKey, ancestor: &TableKey) -> bool {
        self.relationships.iter().any(|rel| {
            rel.name == name
                && rel.dependent_table == *dependent
                && rel.ancestor_table == *ancestor
        })
    }
}

/// Load foreign keys for every involved table and fold constraints the
/// initial discovery missed into the hierarchy, then rebuild levels.
///
/// The recursive discovery walk only follows paths outward from the root;
/// a constraint between two already-discovered tables that lies off every
/// walked path is invisible to it. Those are exactly the constraints this
/// pass recovers. Returns the number of relationships added.
pub fn augment_relationships<M: MetadataService>(
    hierarchy: &mut Hierarchy,
    catalog: &mut TableCatalog,
    metadata: &mut M,
) -> CleanupResult<usize> {
    let involved = hierarchy.involved_tables();

    let mut additional = Vec::new();
    for table in &involved {
        let foreign_keys = catalog.ensure_foreign_keys(metadata, table)?;
        for (fk_name, fk) in &foreign_keys {
            let referenced = fk.referenced_key();
            if !involved.contains(&referenced) {
                continue;
            }
            if hierarchy.contains_relationship(fk_name, &fk.parent_key(), &referenced) {
                continue;
            }
            info!("Found additional FK: {fk_name}");
            additional.push(Relationship::from_foreign_key(fk));
        }
    }

    let added = additional.len();
    if added > 0 {
        hierarchy.relationships.extend(additional);
    }

    hierarchy.rebuild_table_levels();
    Ok(added)
}
