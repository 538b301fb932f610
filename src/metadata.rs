//! Database metadata retrieval.
//!
//! [`MetadataService`] is the contract the planner consumes; callers can
//! substitute any implementation (the test suite uses an in-memory one).
//! [`SqlServerMetadata`] is the default implementation, reading
//! `INFORMATION_SCHEMA` and the `sys.*` catalog views through a
//! [`QueryExecutor`].
//!
//! Per-query failures here are deliberately non-fatal: a permission gap on
//! one catalog view degrades that lookup to an empty result and the run
//! continues. Under-cascading is the safe failure direction.

use indexmap::IndexMap;
use log::warn;

use crate::error::CleanupResult;
use crate::executor::{QueryExecutor, Row};
use crate::hierarchy::Hierarchy;
use crate::model::{DbColumn, ForeignKey, PrimaryKey, Relationship, TableKey, UniqueKey};
use crate::validation::validate_sql_identifier;

/// Metadata operations the cascade planner needs from its environment.
pub trait MetadataService {
    fn get_columns(&mut self, table: &TableKey) -> CleanupResult<Vec<DbColumn>>;

    fn get_primary_key(&mut self, table: &TableKey) -> CleanupResult<Option<PrimaryKey>>;

    fn get_unique_keys(&mut self, table: &TableKey)
        -> CleanupResult<IndexMap<String, UniqueKey>>;

    fn get_foreign_keys(&mut self, table: &TableKey)
        -> CleanupResult<IndexMap<String, ForeignKey>>;

    /// Walk the foreign-key graph outward from `root`, returning the
    /// discovered relationships plus per-table traversal levels (root = 0).
    fn build_hierarchy(&mut self, root: &TableKey) -> CleanupResult<Hierarchy>;
}

/// Default [`MetadataService`] for SQL Server catalogs.
pub struct SqlServerMetadata<E> {
    executor: E,
}

impl<E: QueryExecutor> SqlServerMetadata<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn into_inner(self) -> E {
        self.executor
    }

    fn run_query(&mut self, sql: &str, operation: &str, table: &TableKey) -> Vec<Row> {
        match self.executor.query(sql) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Error in {} for '{}': {}", operation, table.qualified(), e);
                Vec::new()
            }
        }
    }

    /// Declared type of one column, empty string when unknown.
    fn get_column_data_type(&mut self, table: &TableKey, column_name: &str) -> String {
        if validate_sql_identifier(column_name, "column_name").is_err() {
            return String::new();
        }
        let sql = format!(
            "SELECT DATA_TYPE + CASE \
                WHEN CHARACTER_MAXIMUM_LENGTH IS NOT NULL \
                THEN '(' + CAST(CHARACTER_MAXIMUM_LENGTH AS VARCHAR) + ')' \
                ELSE '' END AS DATA_TYPE \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}' AND COLUMN_NAME = '{}'",
            table.schema, table.table, column_name
        );
        let rows = self.run_query(&sql, "get_column_data_type", table);
        rows.first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_text())
            .unwrap_or_default()
            .to_string()
    }

    /// Resolve column names for one side of a constraint against the
    /// table's column list, falling back to a per-column type lookup for
    /// anything the list does not carry.
    fn typed_columns(
        &mut self,
        cache: &mut IndexMap<TableKey, Vec<DbColumn>>,
        table: &TableKey,
        names: &[String],
    ) -> CleanupResult<Vec<DbColumn>> {
        if !cache.contains_key(table) {
            let columns = self.get_columns(table)?;
            cache.insert(table.clone(), columns);
        }
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let known = cache[table].iter().find(|c| &c.column_name == name).cloned();
            let column = match known {
                Some(column) => column,
                None => DbColumn::new(name, &self.get_column_data_type(table, name)),
            };
            resolved.push(column);
        }
        Ok(resolved)
    }

    fn hierarchy_query(root: &TableKey) -> String {
        // Anchor: constraints referencing the root. Recursive step: constraints
        // referencing any table already found, guarded against path cycles.
        // Aliased *_P columns are the referenced (ancestor) side; *_R are the
        // dependent side holding the constraint.
        format!(
            "WITH hierarchy AS ( \
                SELECT \
                    FK.name AS foreign_key_name, \
                    SS_P.name AS parent_schema, \
                    SO_P.name AS parent_table, \
                    SC_P.name AS parent_column, \
                    SS_R.name AS referenced_schema, \
                    SO_R.name AS referenced_table, \
                    SC_R.name AS referenced_column, \
                    1 AS hierarchy_level, \
                    CAST(SS_P.name + '.' + SO_P.name + ' -> ' + SS_R.name + '.' + SO_R.name AS varchar(900)) AS hierarchy_path \
                FROM sys.foreign_key_columns FKC \
                INNER JOIN sys.foreign_keys FK ON FK.object_id = FKC.constraint_object_id \
                INNER JOIN sys.objects SO_P ON SO_P.object_id = FKC.referenced_object_id \
                INNER JOIN sys.schemas SS_P ON SS_P.schema_id = SO_P.schema_id \
                INNER JOIN sys.columns SC_P ON SC_P.object_id = FKC.referenced_object_id AND SC_P.column_id = FKC.referenced_column_id \
                INNER JOIN sys.objects SO_R ON SO_R.object_id = FKC.parent_object_id \
                INNER JOIN sys.schemas SS_R ON SS_R.schema_id = SO_R.schema_id \
                INNER JOIN sys.columns SC_R ON SC_R.object_id = FKC.parent_object_id AND SC_R.column_id = FKC.parent_column_id \
                WHERE SS_P.name = '{schema}' AND SO_P.name = '{table}' \
                UNION ALL \
                SELECT \
                    FK.name AS foreign_key_name, \
                    SS_P.name AS parent_schema, \
                    SO_P.name AS parent_table, \
                    SC_P.name AS parent_column, \
                    SS_R.name AS referenced_schema, \
                    SO_R.name AS referenced_table, \
                    SC_R.name AS referenced_column, \
                    h.hierarchy_level + 1 AS hierarchy_level, \
                    CAST(h.hierarchy_path + ' -> ' + SS_R.name + '.' + SO_R.name AS VARCHAR(900)) AS hierarchy_path \
                FROM sys.foreign_key_columns FKC \
                INNER JOIN sys.foreign_keys FK ON FK.object_id = FKC.constraint_object_id \
                INNER JOIN sys.objects SO_P ON SO_P.object_id = FKC.referenced_object_id \
                INNER JOIN sys.schemas SS_P ON SS_P.schema_id = SO_P.schema_id \
                INNER JOIN sys.columns SC_P ON SC_P.object_id = FKC.referenced_object_id AND SC_P.column_id = FKC.referenced_column_id \
                INNER JOIN sys.objects SO_R ON SO_R.object_id = FKC.parent_object_id \
                INNER JOIN sys.schemas SS_R ON SS_R.schema_id = SO_R.schema_id \
                INNER JOIN sys.columns SC_R ON SC_R.object_id = FKC.parent_object_id AND SC_R.column_id = FKC.parent_column_id \
                INNER JOIN hierarchy h ON h.referenced_schema = SS_P.name AND h.referenced_table = SO_P.name \
                WHERE h.hierarchy_path NOT LIKE '%' + SS_R.name + '.' + SO_R.name + '%' \
            ) \
            SELECT foreign_key_name, parent_schema, parent_table, parent_column, \
                   referenced_schema, referenced_table, referenced_column, \
                   hierarchy_level, hierarchy_path \
            FROM hierarchy \
            ORDER BY hierarchy_level, foreign_key_name, parent_column",
            schema = root.schema,
            table = root.table
        )
    }
}

fn row_text(row: &Row, i: usize) -> String {
    row.get(i)
        .and_then(|v| v.as_text())
        .unwrap_or_default()
        .to_string()
}

fn row_int(row: &Row, i: usize) -> i64 {
    row.get(i).and_then(|v| v.as_int()).unwrap_or_default()
}

/// One constraint's rows from the hierarchy query, accumulated column by
/// column in ordinal order.
#[derive(Debug)]
struct HierarchyGroup {
    ancestor: TableKey,
    dependent: TableKey,
    ancestor_columns: Vec<String>,
    dependent_columns: Vec<String>,
    level: u32,
    path: String,
}

impl<E: QueryExecutor> MetadataService for SqlServerMetadata<E> {
    fn get_columns(&mut self, table: &TableKey) -> CleanupResult<Vec<DbColumn>> {
        validate_sql_identifier(&table.schema, "schema")?;
        validate_sql_identifier(&table.table, "table")?;

        let sql = format!(
            "SELECT COLUMN_NAME, \
                DATA_TYPE + CASE \
                    WHEN CHARACTER_MAXIMUM_LENGTH IS NOT NULL \
                    THEN '(' + CAST(CHARACTER_MAXIMUM_LENGTH AS VARCHAR) + ')' \
                    ELSE '' END AS DATA_TYPE \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}' \
             ORDER BY ORDINAL_POSITION",
            table.schema, table.table
        );

        let rows = self.run_query(&sql, "get_columns", table);
        Ok(rows
            .iter()
            .map(|row| DbColumn::new(&row_text(row, 0), &row_text(row, 1)))
            .collect())
    }

    fn get_primary_key(&mut self, table: &TableKey) -> CleanupResult<Option<PrimaryKey>> {
        validate_sql_identifier(&table.schema, "schema")?;
        validate_sql_identifier(&table.table, "table")?;

        let sql = format!(
            "SELECT kc.name AS constraint_name, c.name AS column_name, \
                c.column_id AS column_id, TYPE_NAME(c.system_type_id) AS data_type, \
                c.is_identity AS is_identity \
             FROM sys.key_constraints kc \
             INNER JOIN sys.index_columns ic \
                ON kc.parent_object_id = ic.object_id AND kc.unique_index_id = ic.index_id \
             INNER JOIN sys.columns c \
                ON ic.object_id = c.object_id AND ic.column_id = c.column_id \
             WHERE kc.type = 'PK' \
                AND OBJECT_SCHEMA_NAME(kc.parent_object_id) = '{}' \
                AND OBJECT_NAME(kc.parent_object_id) = '{}' \
             ORDER BY ic.key_ordinal",
            table.schema, table.table
        );

        let rows = self.run_query(&sql, "get_primary_key", table);
        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let name = row_text(first, 0);
        let columns = rows
            .iter()
            .map(|row| DbColumn::new(&row_text(row, 1), &row_text(row, 3)))
            .collect();
        Ok(Some(PrimaryKey::new(&name, columns)))
    }

    fn get_unique_keys(
        &mut self,
        table: &TableKey,
    ) -> CleanupResult<IndexMap<String, UniqueKey>> {
        validate_sql_identifier(&table.schema, "schema")?;
        validate_sql_identifier(&table.table, "table")?;

        let sql = format!(
            "SELECT DISTINCT i.name AS constraint_name, c.name AS column_name, \
                ic.key_ordinal AS key_ordinal, TYPE_NAME(c.system_type_id) AS data_type \
             FROM sys.indexes AS i \
             JOIN sys.index_columns AS ic \
                ON i.object_id = ic.object_id AND i.index_id = ic.index_id \
             JOIN sys.columns AS c \
                ON ic.object_id = c.object_id AND ic.column_id = c.column_id \
             WHERE i.is_unique = 1 \
                AND i.is_primary_key = 0 \
                AND OBJECT_SCHEMA_NAME(i.object_id) = '{}' \
                AND OBJECT_NAME(i.object_id) = '{}' \
                AND ic.is_included_column = 0 \
             ORDER BY constraint_name, key_ordinal",
            table.schema, table.table
        );

        let rows = self.run_query(&sql, "get_unique_keys", table);
        let mut unique_keys: IndexMap<String, UniqueKey> = IndexMap::new();
        for row in &rows {
            let name = row_text(row, 0);
            let column = DbColumn::new(&row_text(row, 1), &row_text(row, 3));
            unique_keys
                .entry(name.clone())
                .or_insert_with(|| UniqueKey::new(&name, Vec::new()))
                .columns
                .push(column);
        }
        Ok(unique_keys)
    }

    fn get_foreign_keys(
        &mut self,
        table: &TableKey,
    ) -> CleanupResult<IndexMap<String, ForeignKey>> {
        validate_sql_identifier(&table.schema, "schema")?;
        validate_sql_identifier(&table.table, "table")?;

        let sql = format!(
            "SELECT FK.name AS foreign_key_name, \
                OBJECT_SCHEMA_NAME(FKC.parent_object_id) AS parent_schema, \
                OBJECT_NAME(FKC.parent_object_id) AS parent_table, \
                C.name AS parent_column, \
                OBJECT_SCHEMA_NAME(FKC.referenced_object_id) AS referenced_schema, \
                OBJECT_NAME(FKC.referenced_object_id) AS referenced_table, \
                CR.name AS referenced_column, \
                FKC.constraint_column_id AS column_ordinal, \
                TYPE_NAME(C.system_type_id) AS parent_data_type, \
                TYPE_NAME(CR.system_type_id) AS referenced_data_type \
             FROM sys.foreign_keys AS FK \
             JOIN sys.foreign_key_columns AS FKC ON FK.object_id = FKC.constraint_object_id \
             JOIN sys.columns AS C ON FKC.parent_column_id = C.column_id \
                AND FKC.parent_object_id = C.object_id \
             JOIN sys.columns AS CR ON FKC.referenced_column_id = CR.column_id \
                AND FKC.referenced_object_id = CR.object_id \
             WHERE OBJECT_SCHEMA_NAME(FK.parent_object_id) = '{}' \
                AND OBJECT_NAME(FK.parent_object_id) = '{}' \
             ORDER BY foreign_key_name, column_ordinal",
            table.schema, table.table
        );

        let rows = self.run_query(&sql, "get_foreign_keys", table);

        // group column pairs by constraint name, ordinal order preserved
        struct FkGroup {
            parent_schema: String,
            parent_table: String,
            referenced_schema: String,
            referenced_table: String,
            parent_columns: Vec<DbColumn>,
            referenced_columns: Vec<DbColumn>,
        }

        let mut groups: IndexMap<String, FkGroup> = IndexMap::new();
        for row in &rows {
            let name = row_text(row, 0);
            let group = groups.entry(name).or_insert_with(|| FkGroup {
                parent_schema: row_text(row, 1),
                parent_table: row_text(row, 2),
                referenced_schema: row_text(row, 4),
                referenced_table: row_text(row, 5),
                parent_columns: Vec::new(),
                referenced_columns: Vec::new(),
            });
            group
                .parent_columns
                .push(DbColumn::new(&row_text(row, 3), &row_text(row, 8)));
            group
                .referenced_columns
                .push(DbColumn::new(&row_text(row, 6), &row_text(row, 9)));
        }

        let mut foreign_keys = IndexMap::new();
        for (name, group) in groups {
            let fk = ForeignKey::new(
                &name,
                &group.parent_schema,
                &group.parent_table,
                group.parent_columns,
                &group.referenced_schema,
                &group.referenced_table,
                group.referenced_columns,
            )?;
            foreign_keys.insert(name, fk);
        }
        Ok(foreign_keys)
    }

    fn build_hierarchy(&mut self, root: &TableKey) -> CleanupResult<Hierarchy> {
        validate_sql_identifier(&root.schema, "schema")?;
        validate_sql_identifier(&root.table, "table")?;

        let mut hierarchy = Hierarchy::new(root.clone());

        let sql = Self::hierarchy_query(root);
        let rows = self.run_query(&sql, "build_hierarchy", root);

        // group rows by constraint name, first-seen order (rows arrive
        // ordered by level, so the first sighting of a table carries its
        // shallowest discovery level)
        let mut groups: IndexMap<String, HierarchyGroup> = IndexMap::new();
        for row in &rows {
            let name = row_text(row, 0);
            #[allow(clippy::cast_sign_loss)]
            let level = row_int(row, 7).max(0) as u32;
            let group = groups.entry(name).or_insert_with(|| HierarchyGroup {
                ancestor: TableKey::new(&row_text(row, 1), &row_text(row, 2)),
                dependent: TableKey::new(&row_text(row, 4), &row_text(row, 5)),
                ancestor_columns: Vec::new(),
                dependent_columns: Vec::new(),
                level,
                path: row_text(row, 8),
            });
            let ancestor_column = row_text(row, 3);
            if !group.ancestor_columns.contains(&ancestor_column) {
                group.ancestor_columns.push(ancestor_column);
            }
            let dependent_column = row_text(row, 6);
            if !group.dependent_columns.contains(&dependent_column) {
                group.dependent_columns.push(dependent_column);
            }
        }

        // column types come from each table's column list, fetched once
        let mut columns_cache: IndexMap<TableKey, Vec<DbColumn>> = IndexMap::new();

        for (name, group) in &groups {
            let ancestor_columns =
                self.typed_columns(&mut columns_cache, &group.ancestor, &group.ancestor_columns)?;
            let dependent_columns = self.typed_columns(
                &mut columns_cache,
                &group.dependent,
                &group.dependent_columns,
            )?;

            // first sighting wins; the fixed-point rebuild after
            // augmentation recomputes these anyway
            let ancestor_level = group.level.saturating_sub(1);
            hierarchy
                .table_levels
                .entry(group.ancestor.clone())
                .or_insert(ancestor_level);
            hierarchy
                .table_levels
                .entry(group.dependent.clone())
                .or_insert(group.level);

            let ancestor_path = group
                .path
                .split(" -> ")
                .next()
                .unwrap_or_default()
                .to_string();
            hierarchy
                .hierarchy_paths
                .entry(group.ancestor.clone())
                .or_insert(ancestor_path);
            hierarchy
                .hierarchy_paths
                .entry(group.dependent.clone())
                .or_insert_with(|| group.path.clone());

            let relationship = Relationship::new(
                name,
                group.dependent.clone(),
                dependent_columns,
                group.ancestor.clone(),
                ancestor_columns,
            )?;
            hierarchy.relationships.push(relationship);
        }

        Ok(hierarchy)
    }
}
