//! In-memory database for the test suite.
//!
//! [`MemoryDatabase`] holds declared tables with rows and implements both
//! collaborator seams, [`QueryExecutor`] for the planner's data queries
//! and [`MetadataService`] for schema lookups, while logging every
//! statement it receives. It understands exactly the SQL this crate
//! generates (projections with `IN` lists and OR'ed equality groups,
//! DELETEs, transaction control), which is enough to run whole cascade
//! scenarios end to end without a server.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::error::{CleanupError, CleanupResult};
use crate::executor::{QueryExecutor, Row};
use crate::hierarchy::Hierarchy;
use crate::metadata::MetadataService;
use crate::model::{DbColumn, ForeignKey, PrimaryKey, Relationship, TableKey, UniqueKey};
use crate::value::{parse_literal, SqlValue};

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<DbColumn>,
    primary_key: Option<PrimaryKey>,
    foreign_keys: IndexMap<String, ForeignKey>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: IndexMap<TableKey, MemTable>,
    /// Every statement seen, queries and executions alike
    pub statements: Vec<String>,
    fail_substrings: Vec<String>,
    /// FK names build_hierarchy pretends not to discover, so augmentation
    /// has something to find
    hierarchy_blind_spots: Vec<String>,
    tx_backup: Option<IndexMap<TableKey, Vec<Row>>>,
    pub begin_count: usize,
    pub commit_count: usize,
    pub rollback_count: usize,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[(&str, &str)],
        pk_columns: &[&str],
    ) {
        let declared: Vec<DbColumn> = columns
            .iter()
            .map(|(name, ty)| DbColumn::new(name, ty))
            .collect();
        let primary_key = if pk_columns.is_empty() {
            None
        } else {
            let pk_cols = pk_columns
                .iter()
                .map(|name| {
                    declared
                        .iter()
                        .find(|c| &c.column_name == name)
                        .cloned()
                        .unwrap_or_else(|| DbColumn::new(name, "int"))
                })
                .collect();
            Some(PrimaryKey::new(&format!("PK_{table}"), pk_cols))
        };
        self.tables.insert(
            TableKey::new(schema, table),
            MemTable {
                columns: declared,
                primary_key,
                foreign_keys: IndexMap::new(),
                rows: Vec::new(),
            },
        );
    }

    pub fn add_foreign_key(
        &mut self,
        name: &str,
        child: (&str, &str),
        child_columns: &[&str],
        parent: (&str, &str),
        parent_columns: &[&str],
    ) {
        let child_key = TableKey::new(child.0, child.1);
        let resolve = |key: &TableKey, names: &[&str]| -> Vec<DbColumn> {
            names
                .iter()
                .map(|n| {
                    self.tables
                        .get(key)
                        .and_then(|t| t.columns.iter().find(|c| &c.column_name == n))
                        .cloned()
                        .unwrap_or_else(|| DbColumn::new(n, "int"))
                })
                .collect()
        };
        let fk = ForeignKey::new(
            name,
            child.0,
            child.1,
            resolve(&child_key, child_columns),
            parent.0,
            parent.1,
            resolve(&TableKey::new(parent.0, parent.1), parent_columns),
        )
        .expect("test fixture FK arity");
        if let Some(table) = self.tables.get_mut(&child_key) {
            table.foreign_keys.insert(name.to_string(), fk);
        }
    }

    pub fn insert_row(&mut self, schema: &str, table: &str, values: Vec<SqlValue>) {
        if let Some(t) = self.tables.get_mut(&TableKey::new(schema, table)) {
            t.rows.push(values);
        }
    }

    /// Any statement containing `needle` fails with a QueryFailed error.
    pub fn fail_queries_containing(&mut self, needle: &str) {
        self.fail_substrings.push(needle.to_string());
    }

    /// Hide a constraint from build_hierarchy; get_foreign_keys still
    /// reports it, mirroring a constraint the recursive walk cannot reach.
    pub fn skip_in_hierarchy(&mut self, fk_name: &str) {
        self.hierarchy_blind_spots.push(fk_name.to_string());
    }

    pub fn row_count(&self, schema: &str, table: &str) -> usize {
        self.tables
            .get(&TableKey::new(schema, table))
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    pub fn shared(self) -> SharedDb {
        SharedDb(Rc::new(RefCell::new(self)))
    }

    fn check_failure(&self, sql: &str) -> CleanupResult<()> {
        if let Some(needle) = self.fail_substrings.iter().find(|n| sql.contains(n.as_str())) {
            return Err(CleanupError::QueryFailed {
                query: sql.to_string(),
                error: format!("injected failure for '{needle}'"),
            });
        }
        Ok(())
    }

    fn run_select(&mut self, sql: &str) -> CleanupResult<Vec<Row>> {
        let rest = strip_prefix_ci(sql.trim(), "SELECT").ok_or_else(|| unsupported(sql))?;
        let (distinct, rest) = match strip_prefix_ci(rest.trim_start(), "DISTINCT") {
            Some(r) => (true, r),
            None => (false, rest),
        };

        let (columns_part, rest) = split_once_ci(rest, " FROM ").ok_or_else(|| unsupported(sql))?;
        let (table_part, predicate_part) = match split_once_ci(rest, " WHERE ") {
            Some((t, p)) => (t, Some(p)),
            None => (rest, None),
        };

        let key = parse_table_ref(table_part.trim()).ok_or_else(|| unsupported(sql))?;
        let table = self.tables.get(&key).ok_or_else(|| CleanupError::QueryFailed {
            query: sql.to_string(),
            error: format!("unknown table {}", key.qualified()),
        })?;

        let mut indices = Vec::new();
        for raw in columns_part.split(',') {
            let name = strip_brackets(raw.trim());
            let idx = table
                .columns
                .iter()
                .position(|c| c.column_name == name)
                .ok_or_else(|| CleanupError::QueryFailed {
                    query: sql.to_string(),
                    error: format!("unknown column {name}"),
                })?;
            indices.push(idx);
        }

        let predicate = predicate_part
            .map(|p| Predicate::parse(p.trim()).ok_or_else(|| unsupported(sql)))
            .transpose()?;

        let mut projected: Vec<Row> = Vec::new();
        for row in &table.rows {
            let matches = match &predicate {
                Some(p) => p.eval(&table.columns, row),
                None => true,
            };
            if matches {
                projected.push(indices.iter().map(|&i| row[i].clone()).collect());
            }
        }

        if distinct {
            let set: IndexSet<Row> = projected.into_iter().collect();
            projected = set.into_iter().collect();
        }
        Ok(projected)
    }

    fn run_delete(&mut self, sql: &str) -> CleanupResult<u64> {
        let rest = strip_prefix_ci(sql.trim(), "DELETE FROM").ok_or_else(|| unsupported(sql))?;
        let (table_part, predicate_part) =
            split_once_ci(rest, " WHERE ").ok_or_else(|| unsupported(sql))?;

        let key = parse_table_ref(table_part.trim()).ok_or_else(|| unsupported(sql))?;
        let table = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| CleanupError::QueryFailed {
                query: sql.to_string(),
                error: format!("unknown table {}", key.qualified()),
            })?;

        let predicate = Predicate::parse(predicate_part.trim()).ok_or_else(|| unsupported(sql))?;

        let before = table.rows.len();
        let columns = table.columns.clone();
        table.rows.retain(|row| !predicate.eval(&columns, row));
        Ok((before - table.rows.len()) as u64)
    }
}

impl QueryExecutor for MemoryDatabase {
    fn query(&mut self, sql: &str) -> CleanupResult<Vec<Row>> {
        self.statements.push(sql.to_string());
        self.check_failure(sql)?;
        self.run_select(sql)
    }

    fn execute(&mut self, sql: &str) -> CleanupResult<u64> {
        self.statements.push(sql.to_string());
        self.check_failure(sql)?;

        let trimmed = sql.trim();
        if trimmed.eq_ignore_ascii_case("BEGIN TRANSACTION") {
            self.begin_count += 1;
            self.tx_backup = Some(
                self.tables
                    .iter()
                    .map(|(k, t)| (k.clone(), t.rows.clone()))
                    .collect(),
            );
            return Ok(0);
        }
        if trimmed.eq_ignore_ascii_case("COMMIT TRANSACTION") {
            self.commit_count += 1;
            self.tx_backup = None;
            return Ok(0);
        }
        if trimmed.eq_ignore_ascii_case("ROLLBACK TRANSACTION") {
            self.rollback_count += 1;
            if let Some(backup) = self.tx_backup.take() {
                for (key, rows) in backup {
                    if let Some(table) = self.tables.get_mut(&key) {
                        table.rows = rows;
                    }
                }
            }
            return Ok(0);
        }
        self.run_delete(sql)
    }
}

impl MetadataService for MemoryDatabase {
    fn get_columns(&mut self, table: &TableKey) -> CleanupResult<Vec<DbColumn>> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    fn get_primary_key(&mut self, table: &TableKey) -> CleanupResult<Option<PrimaryKey>> {
        Ok(self.tables.get(table).and_then(|t| t.primary_key.clone()))
    }

    fn get_unique_keys(
        &mut self,
        _table: &TableKey,
    ) -> CleanupResult<IndexMap<String, UniqueKey>> {
        Ok(IndexMap::new())
    }

    fn get_foreign_keys(
        &mut self,
        table: &TableKey,
    ) -> CleanupResult<IndexMap<String, ForeignKey>> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.foreign_keys.clone())
            .unwrap_or_default())
    }

    fn build_hierarchy(&mut self, root: &TableKey) -> CleanupResult<Hierarchy> {
        let mut hierarchy = Hierarchy::new(root.clone());
        let mut discovered: IndexSet<TableKey> = IndexSet::new();
        discovered.insert(root.clone());

        // fixpoint walk outward: follow constraints referencing any
        // discovered table
        let mut added = true;
        while added {
            added = false;
            for (key, table) in &self.tables {
                for fk in table.foreign_keys.values() {
                    if self.hierarchy_blind_spots.contains(&fk.name) {
                        continue;
                    }
                    if !discovered.contains(&fk.referenced_key()) {
                        continue;
                    }
                    let already = hierarchy
                        .relationships
                        .iter()
                        .any(|r| r.name == fk.name && r.dependent_table == *key);
                    if already {
                        continue;
                    }
                    hierarchy.relationships.push(Relationship::from_foreign_key(fk));
                    discovered.insert(key.clone());
                    added = true;
                }
            }
        }

        hierarchy.rebuild_table_levels();
        for table in &discovered {
            hierarchy
                .hierarchy_paths
                .entry(table.clone())
                .or_insert_with(|| table.qualified());
        }
        Ok(hierarchy)
    }
}

/// Clonable handle so one database can serve as both collaborators at
/// once. Single-threaded, like the planner itself.
#[derive(Clone)]
pub struct SharedDb(Rc<RefCell<MemoryDatabase>>);

impl SharedDb {
    pub fn db(&self) -> Ref<'_, MemoryDatabase> {
        self.0.borrow()
    }

    pub fn db_mut(&self) -> RefMut<'_, MemoryDatabase> {
        self.0.borrow_mut()
    }
}

impl QueryExecutor for SharedDb {
    fn query(&mut self, sql: &str) -> CleanupResult<Vec<Row>> {
        self.0.borrow_mut().query(sql)
    }

    fn execute(&mut self, sql: &str) -> CleanupResult<u64> {
        self.0.borrow_mut().execute(sql)
    }
}

impl MetadataService for SharedDb {
    fn get_columns(&mut self, table: &TableKey) -> CleanupResult<Vec<DbColumn>> {
        self.0.borrow_mut().get_columns(table)
    }

    fn get_primary_key(&mut self, table: &TableKey) -> CleanupResult<Option<PrimaryKey>> {
        self.0.borrow_mut().get_primary_key(table)
    }

    fn get_unique_keys(
        &mut self,
        table: &TableKey,
    ) -> CleanupResult<IndexMap<String, UniqueKey>> {
        self.0.borrow_mut().get_unique_keys(table)
    }

    fn get_foreign_keys(
        &mut self,
        table: &TableKey,
    ) -> CleanupResult<IndexMap<String, ForeignKey>> {
        self.0.borrow_mut().get_foreign_keys(table)
    }

    fn build_hierarchy(&mut self, root: &TableKey) -> CleanupResult<Hierarchy> {
        self.0.borrow_mut().build_hierarchy(root)
    }
}

// ---- restricted SQL parsing -------------------------------------------

fn unsupported(sql: &str) -> CleanupError {
    CleanupError::QueryFailed {
        query: sql.to_string(),
        error: "unsupported statement in MemoryDatabase".to_string(),
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}

fn split_once_ci<'a>(s: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    let lower = s.to_ascii_lowercase();
    let pos = lower.find(&sep.to_ascii_lowercase())?;
    Some((&s[..pos], &s[pos + sep.len()..]))
}

fn strip_brackets(s: &str) -> String {
    s.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string()
}

fn parse_table_ref(s: &str) -> Option<TableKey> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 2 {
        return None;
    }
    Some(TableKey::new(
        &strip_brackets(parts[0]),
        &strip_brackets(parts[1]),
    ))
}

/// Split on `sep` outside string literals
fn split_outside_strings(s: &str, sep: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let sep_chars: Vec<char> = sep.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\'' {
            in_string = !in_string;
            current.push('\'');
            i += 1;
            continue;
        }
        if !in_string && chars[i..].starts_with(sep_chars.as_slice()) {
            parts.push(current.trim().to_string());
            current.clear();
            i += sep_chars.len();
            continue;
        }
        current.push(chars[i]);
        i += 1;
    }
    parts.push(current.trim().to_string());
    parts
}

#[derive(Debug)]
enum Condition {
    IsNull(String),
    Equals(String, SqlValue),
}

#[derive(Debug)]
enum Predicate {
    AlwaysFalse,
    InList { column: String, values: Vec<SqlValue> },
    AnyGroup(Vec<Vec<Condition>>),
}

impl Predicate {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s == "1=0" {
            return Some(Predicate::AlwaysFalse);
        }

        if let Some((column_part, list_part)) = split_once_ci(s, " IN ") {
            let cp = column_part.trim();
            // only a bare bracketed column qualifies; anything else is a
            // literal that happened to contain " IN "
            if cp.starts_with('[') && cp.ends_with(']') && !cp.contains(' ') {
                let inner = list_part.trim().strip_prefix('(')?.strip_suffix(')')?;
                let values = split_outside_strings(inner, ",")
                    .iter()
                    .map(|v| parse_literal(v))
                    .collect::<Option<Vec<_>>>()?;
                return Some(Predicate::InList {
                    column: strip_brackets(cp),
                    values,
                });
            }
        }

        let mut groups = Vec::new();
        for group in split_outside_strings(s, " OR ") {
            let body = group
                .trim()
                .strip_prefix('(')
                .and_then(|g| g.strip_suffix(')'))
                .unwrap_or(&group);
            let mut conditions = Vec::new();
            for condition in split_outside_strings(body, " AND ") {
                conditions.push(Condition::parse(&condition)?);
            }
            groups.push(conditions);
        }
        Some(Predicate::AnyGroup(groups))
    }

    fn eval(&self, columns: &[DbColumn], row: &Row) -> bool {
        let index_of = |name: &str| columns.iter().position(|c| c.column_name == name);
        match self {
            Predicate::AlwaysFalse => false,
            Predicate::InList { column, values } => index_of(column)
                .map(|i| values.contains(&row[i]))
                .unwrap_or(false),
            Predicate::AnyGroup(groups) => groups.iter().any(|conditions| {
                conditions.iter().all(|c| match c {
                    Condition::IsNull(column) => {
                        index_of(column).map(|i| row[i].is_null()).unwrap_or(false)
                    }
                    Condition::Equals(column, value) => {
                        index_of(column).map(|i| &row[i] == value).unwrap_or(false)
                    }
                })
            }),
        }
    }
}

impl Condition {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(column_part) = s.strip_suffix(" IS NULL") {
            return Some(Condition::IsNull(strip_brackets(column_part)));
        }
        let parts = split_outside_strings(s, " = ");
        if parts.len() != 2 {
            return None;
        }
        Some(Condition::Equals(
            strip_brackets(&parts[0]),
            parse_literal(&parts[1])?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_db() -> MemoryDatabase {
        let mut db = MemoryDatabase::new();
        db.add_table(
            "dbo",
            "Orders",
            &[("id", "int"), ("customer", "varchar(50)")],
            &["id"],
        );
        db.insert_row("dbo", "Orders", vec![SqlValue::Int(1), SqlValue::from("O'Brien")]);
        db.insert_row("dbo", "Orders", vec![SqlValue::Int(2), SqlValue::from("Smith")]);
        db.insert_row("dbo", "Orders", vec![SqlValue::Int(3), SqlValue::Null]);
        db
    }

    #[test]
    fn test_select_with_in_list() {
        let mut db = sample_db();
        let rows = db
            .query("SELECT DISTINCT [id] FROM [dbo].[Orders] WHERE [id] IN (1, 3)")
            .unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(3)]]);
    }

    #[test]
    fn test_select_with_equality_groups() {
        let mut db = sample_db();
        let rows = db
            .query(
                "SELECT [id] FROM [dbo].[Orders] \
                 WHERE ([customer] = 'O''Brien') OR ([customer] IS NULL)",
            )
            .unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(3)]]);
    }

    #[test]
    fn test_select_without_where_returns_all() {
        let mut db = sample_db();
        let rows = db.query("SELECT [id] FROM [dbo].[Orders]").unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_always_false_predicate() {
        let mut db = sample_db();
        let rows = db
            .query("SELECT [id] FROM [dbo].[Orders] WHERE 1=0")
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_delete_counts_and_removes() {
        let mut db = sample_db();
        let affected = db
            .execute("DELETE FROM [dbo].[Orders] WHERE [id] IN (1, 2)")
            .unwrap();
        assert_eq!(affected, 2);
        assert_eq!(db.row_count("dbo", "Orders"), 1);
    }

    #[test]
    fn test_rollback_restores_rows() {
        let mut db = sample_db();
        db.execute("BEGIN TRANSACTION").unwrap();
        db.execute("DELETE FROM [dbo].[Orders] WHERE [id] IN (1, 2, 3)")
            .unwrap();
        assert_eq!(db.row_count("dbo", "Orders"), 0);

        db.execute("ROLLBACK TRANSACTION").unwrap();
        assert_eq!(db.row_count("dbo", "Orders"), 3);
        assert_eq!(db.rollback_count, 1);
    }

    #[test]
    fn test_commit_keeps_deletions() {
        let mut db = sample_db();
        db.execute("BEGIN TRANSACTION").unwrap();
        db.execute("DELETE FROM [dbo].[Orders] WHERE [id] IN (1)")
            .unwrap();
        db.execute("COMMIT TRANSACTION").unwrap();
        assert_eq!(db.row_count("dbo", "Orders"), 2);
    }

    #[test]
    fn test_injected_failure() {
        let mut db = sample_db();
        db.fail_queries_containing("Orders");
        assert!(db.query("SELECT [id] FROM [dbo].[Orders]").is_err());
    }

    #[test]
    fn test_build_hierarchy_walks_outward() {
        let mut db = MemoryDatabase::new();
        db.add_table("dbo", "Orders", &[("id", "int")], &["id"]);
        db.add_table("dbo", "OrderItems", &[("id", "int"), ("order_id", "int")], &["id"]);
        db.add_table("dbo", "Unrelated", &[("id", "int")], &["id"]);
        db.add_foreign_key(
            "FK_Items_Orders",
            ("dbo", "OrderItems"),
            &["order_id"],
            ("dbo", "Orders"),
            &["id"],
        );

        let hierarchy = db.build_hierarchy(&TableKey::new("dbo", "Orders")).unwrap();
        assert_eq!(hierarchy.relationships.len(), 1);
        assert_eq!(
            hierarchy.level_of(&TableKey::new("dbo", "OrderItems")),
            1
        );
        assert!(!hierarchy
            .table_levels
            .contains_key(&TableKey::new("dbo", "Unrelated")));
    }
}
