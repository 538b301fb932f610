use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use crate::error::{CleanupError, CleanupResult};

/// Identity of a schema-qualified table: the hash/merge key used by the
/// task queue, the relationship index, the deletion order and the metadata
/// cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub schema: String,
    pub table: String,
}

impl TableKey {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    /// `schema.table` form used in logs, maps and script comments
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// `[schema].[table]` form used in generated SQL
    pub fn bracketed(&self) -> String {
        format!("[{}].[{}]", self.schema, self.table)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbColumn {
    pub column_name: String,
    pub data_type: String,
}

impl DbColumn {
    pub fn new(column_name: &str, data_type: &str) -> Self {
        Self {
            column_name: column_name.to_string(),
            data_type: data_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<DbColumn>,
}

impl PrimaryKey {
    pub fn new(name: &str, columns: Vec<DbColumn>) -> Self {
        Self {
            name: name.to_string(),
            columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    pub name: String,
    pub columns: Vec<DbColumn>,
}

impl UniqueKey {
    pub fn new(name: &str, columns: Vec<DbColumn>) -> Self {
        Self {
            name: name.to_string(),
            columns,
        }
    }
}

/// One foreign-key constraint as the catalog reports it.
///
/// Catalog vocabulary: "parent" is the table holding the constraint (the
/// dependent side), "referenced" is the table being pointed at. The
/// traversal-facing [`Relationship`] renames these to avoid the trap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub parent_schema: String,
    pub parent_table: String,
    pub parent_columns: Vec<DbColumn>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<DbColumn>,
}

impl ForeignKey {
    pub fn new(
        name: &str,
        parent_schema: &str,
        parent_table: &str,
        parent_columns: Vec<DbColumn>,
        referenced_schema: &str,
        referenced_table: &str,
        referenced_columns: Vec<DbColumn>,
    ) -> CleanupResult<Self> {
        if parent_columns.len() != referenced_columns.len() {
            return Err(CleanupError::ColumnCountMismatch {
                constraint: name.to_string(),
                dependent_columns: parent_columns.len(),
                ancestor_columns: referenced_columns.len(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            parent_schema: parent_schema.to_string(),
            parent_table: parent_table.to_string(),
            parent_columns,
            referenced_schema: referenced_schema.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_columns,
        })
    }

    pub fn parent_key(&self) -> TableKey {
        TableKey::new(&self.parent_schema, &self.parent_table)
    }

    pub fn referenced_key(&self) -> TableKey {
        TableKey::new(&self.referenced_schema, &self.referenced_table)
    }
}

/// Accumulated metadata for one table.
///
/// The record only ever grows: columns and keys are added as the metadata
/// service is consulted, never removed. Equality and hashing consider only
/// the table identity, so a table picked up early with partial metadata
/// still merges with later discoveries of the same table.
#[derive(Debug, Clone)]
pub struct DbTable {
    pub schema_name: String,
    pub table_name: String,
    pub primary_key: Option<PrimaryKey>,
    pub unique_keys: IndexMap<String, UniqueKey>,
    pub foreign_keys: IndexMap<String, ForeignKey>,
    pub all_columns: Vec<DbColumn>,
}

impl DbTable {
    pub fn new(schema_name: &str, table_name: &str) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            primary_key: None,
            unique_keys: IndexMap::new(),
            foreign_keys: IndexMap::new(),
            all_columns: Vec::new(),
        }
    }

    pub fn key(&self) -> TableKey {
        TableKey::new(&self.schema_name, &self.table_name)
    }

    /// Fully qualified, bracket-quoted name for SQL
    pub fn full_table_name(&self) -> String {
        format!("[{}].[{}]", self.schema_name, self.table_name)
    }

    pub fn find_column(&self, column_name: &str) -> Option<&DbColumn> {
        self.all_columns.iter().find(|c| c.column_name == column_name)
    }
}

impl PartialEq for DbTable {
    fn eq(&self, other: &Self) -> bool {
        self.schema_name == other.schema_name && self.table_name == other.table_name
    }
}

impl Eq for DbTable {}

impl Hash for DbTable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schema_name.hash(state);
        self.table_name.hash(state);
    }
}

/// The traversal-facing view of one foreign-key constraint.
///
/// `dependent_table` holds the FK (its rows must go first); `ancestor_table`
/// is the one being referenced. These are the catalog's "parent" and
/// "referenced" sides respectively; the rename is internal only and the
/// traversal direction matches the catalog semantics exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub name: String,
    pub dependent_table: TableKey,
    pub dependent_columns: Vec<DbColumn>,
    pub ancestor_table: TableKey,
    pub ancestor_columns: Vec<DbColumn>,
}

impl Relationship {
    pub fn new(
        name: &str,
        dependent_table: TableKey,
        dependent_columns: Vec<DbColumn>,
        ancestor_table: TableKey,
        ancestor_columns: Vec<DbColumn>,
    ) -> CleanupResult<Self> {
        if dependent_columns.len() != ancestor_columns.len() {
            return Err(CleanupError::ColumnCountMismatch {
                constraint: name.to_string(),
                dependent_columns: dependent_columns.len(),
                ancestor_columns: ancestor_columns.len(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            dependent_table,
            dependent_columns,
            ancestor_table,
            ancestor_columns,
        })
    }

    /// A ForeignKey has already been arity-checked at construction.
    pub fn from_foreign_key(fk: &ForeignKey) -> Self {
        Self {
            name: fk.name.clone(),
            dependent_table: fk.parent_key(),
            dependent_columns: fk.parent_columns.clone(),
            ancestor_table: fk.referenced_key(),
            ancestor_columns: fk.referenced_columns.clone(),
        }
    }
}
