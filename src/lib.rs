use indexmap::IndexMap;
use log::info;

pub mod cascade;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod hierarchy;
pub mod metadata;
pub mod model;
pub mod queue;
pub mod script;
pub mod sql;
pub mod stats;
pub mod validation;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use cascade::{calculate_operations, fetch_root_ids, CascadeOutcome, RelationshipMap};
pub use catalog::TableCatalog;
pub use config::{CleanupConfig, CleanupMode};
pub use error::{CleanupError, CleanupResult};
pub use executor::{QueryExecutor, Row};
pub use hierarchy::{augment_relationships, Hierarchy};
pub use metadata::{MetadataService, SqlServerMetadata};
pub use model::{DbColumn, DbTable, ForeignKey, PrimaryKey, Relationship, TableKey, UniqueKey};
pub use queue::{CascadeTask, ProcessingQueue, ProcessingStatus};
pub use script::{
    execute_cleanup, generate_cleanup_script, CleanupOperation, ConfirmPrompt, ExecutionOutcome,
};
pub use stats::CascadeStats;
pub use value::{KeyValue, SqlValue};

/// Everything one planning run produces: per-table deletion sets, the
/// order to apply them in, run statistics, and the rendered script.
#[derive(Debug)]
pub struct CleanupPlan {
    pub operations: IndexMap<TableKey, CleanupOperation>,
    pub deletion_order: Vec<TableKey>,
    pub stats: CascadeStats,
    pub script: String,
}

impl CleanupPlan {
    fn empty() -> Self {
        Self {
            operations: IndexMap::new(),
            deletion_order: Vec::new(),
            stats: CascadeStats::default(),
            script: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Plan a full cleanup run: discover the hierarchy, fetch the root rows,
/// cascade, and render the script.
///
/// Returns an empty plan without issuing any cascade query when the root
/// query matches nothing. Execution is separate: hand the plan's
/// operations and deletion order to [`script::execute_cleanup`].
pub fn plan_cleanup<E, M>(
    executor: &mut E,
    metadata: &mut M,
    config: &CleanupConfig,
) -> CleanupResult<CleanupPlan>
where
    E: QueryExecutor,
    M: MetadataService,
{
    config.validate()?;

    let root = config.root_table();
    let mut catalog = TableCatalog::new();
    catalog.ensure_columns(metadata, &root)?;
    if catalog.ensure_primary_key(metadata, &root)?.is_none() {
        return Err(CleanupError::MissingPrimaryKey {
            table: root.qualified(),
        });
    }

    let mut hierarchy = metadata.build_hierarchy(&root)?;
    info!("Found {} relationships", hierarchy.relationships.len());

    let added = augment_relationships(&mut hierarchy, &mut catalog, metadata)?;
    if added > 0 {
        info!("Found {added} additional relationships");
    }

    let root_ids = fetch_root_ids(executor, config)?;
    info!("Found {} records in {}", root_ids.len(), config.table);

    if root_ids.is_empty() {
        info!("No data found for cleanup");
        return Ok(CleanupPlan::empty());
    }

    let deletion_order = hierarchy.deletion_order();

    let outcome = calculate_operations(
        executor,
        metadata,
        &mut catalog,
        &hierarchy,
        root_ids,
        config,
    )?;

    let script = generate_cleanup_script(&outcome.operations, &deletion_order, config);

    Ok(CleanupPlan {
        operations: outcome.operations,
        deletion_order,
        stats: outcome.stats,
        script,
    })
}
