use indexmap::IndexMap;

use crate::model::{Relationship, TableKey};

/// Index from a table to the relationships whose dependent side points at
/// it, which is every way a child table can hang off rows of this table.
#[derive(Debug, Default)]
pub struct RelationshipMap {
    by_ancestor: IndexMap<TableKey, Vec<Relationship>>,
}

impl RelationshipMap {
    pub fn from_relationships(relationships: &[Relationship]) -> Self {
        let mut by_ancestor: IndexMap<TableKey, Vec<Relationship>> = IndexMap::new();
        for rel in relationships {
            by_ancestor
                .entry(rel.ancestor_table.clone())
                .or_default()
                .push(rel.clone());
        }
        Self { by_ancestor }
    }

    /// Relationships depending on `table`, in discovery order; empty for a
    /// true leaf of the dependency graph.
    pub fn child_relationships_of(&self, table: &TableKey) -> &[Relationship] {
        self.by_ancestor
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_children(&self, table: &TableKey) -> bool {
        self.by_ancestor.contains_key(table)
    }

    pub fn relationship_count(&self) -> usize {
        self.by_ancestor.values().map(Vec::len).sum()
    }
}
