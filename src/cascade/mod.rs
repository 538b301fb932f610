//! The cascade planner.
//!
//! Breadth-first over the foreign-key graph: seed the queue with the root
//! table's matched rows, then repeatedly take the shallowest pending table,
//! project the referenced-column values its matched rows expose, and look
//! up which dependent rows point at them. Newly found dependents are merged
//! into the queue one level deeper. The queue's merge-on-revisit semantics
//! union IDs per table, so a row reachable along two foreign-key paths is
//! planned for deletion exactly once and diamond-shaped schemas cannot blow
//! up the work set.
//!
//! The loop drains because every processed table either has no child
//! relationships or eventually projects nothing new; a hard iteration cap
//! guards against surprise cycles in discovered relationships. Hitting the
//! cap logs a warning and keeps the partial result: under-deletion, never
//! over-deletion.

use indexmap::IndexMap;
use log::{info, warn};

use crate::catalog::TableCatalog;
use crate::config::{CleanupConfig, MAX_CASCADE_ITERATIONS};
use crate::error::{CleanupError, CleanupResult};
use crate::executor::QueryExecutor;
use crate::hierarchy::Hierarchy;
use crate::metadata::MetadataService;
use crate::model::TableKey;
use crate::queue::ProcessingQueue;
use crate::script::CleanupOperation;
use crate::stats::{CascadeStats, CascadeTimer};
use crate::value::KeyValue;

mod lookup;
mod map;


pub use lookup::{child_primary_keys, referenced_column_values};
pub use map::RelationshipMap;

/// What one cascade run produced
#[derive(Debug)]
pub struct CascadeOutcome {
    pub operations: IndexMap<TableKey, CleanupOperation>,
    pub stats: CascadeStats,
}

/// Run the configured root query and fold each row into a key value.
pub fn fetch_root_ids<E: QueryExecutor>(
    executor: &mut E,
    config: &CleanupConfig,
) -> CleanupResult<Vec<KeyValue>> {
    let rows = executor.query(&config.query_of_data_to_remove)?;
    Ok(rows.into_iter().map(KeyValue::from_row).collect())
}

/// Compute the full per-table deletion sets for `root_ids`.
///
/// Fails fast with a configuration error when the root table has no
/// primary key; everything downstream degrades per-relationship instead
/// of aborting.
pub fn calculate_operations<E, M>(
    executor: &mut E,
    metadata: &mut M,
    catalog: &mut TableCatalog,
    hierarchy: &Hierarchy,
    root_ids: Vec<KeyValue>,
    config: &CleanupConfig,
) -> CleanupResult<CascadeOutcome>
where
    E: QueryExecutor,
    M: MetadataService,
{
    let root = hierarchy.root_table.clone();
    if catalog.ensure_primary_key(metadata, &root)?.is_none() {
        return Err(CleanupError::MissingPrimaryKey {
            table: root.qualified(),
        });
    }

    let relationship_map = RelationshipMap::from_relationships(&hierarchy.relationships);
    let mut queue = ProcessingQueue::new();
    let mut stats = CascadeStats::default();
    let timer = CascadeTimer::start();

    queue.add_task(root, root_ids, 0);

    let mut iteration = 0usize;
    while queue.has_pending_tasks() {
        iteration += 1;

        let Some(task) = queue.get_next_task() else {
            break;
        };
        let table = task.table.clone();
        let level = task.level;
        let pending_ids = task.ids.clone();

        queue.mark_processing(&table);

        if pending_ids.is_empty() {
            // tasks are only enqueued with rows in hand, so this is a
            // degenerate seed; completing it keeps the queue draining
            queue.mark_completed(&table);
            continue;
        }

        let child_relationships = relationship_map.child_relationships_of(&table);
        if child_relationships.is_empty() {
            info!("No child relationships found for {}", table.qualified());
            queue.mark_completed(&table);
            continue;
        }

        info!(
            "Processing {}: {} records, {} relationships",
            table.qualified(),
            pending_ids.len(),
            child_relationships.len()
        );

        for relationship in child_relationships {
            let referenced_values = lookup::referenced_column_values(
                executor,
                catalog,
                metadata,
                &table,
                &pending_ids,
                &relationship.ancestor_columns,
                config,
            )?;
            if referenced_values.is_empty() {
                continue;
            }

            let child_ids = lookup::child_primary_keys(
                executor,
                catalog,
                metadata,
                &relationship.dependent_table,
                &relationship.dependent_columns,
                &referenced_values,
                config,
            )?;

            if !child_ids.is_empty() {
                info!(
                    "  -> {}: {} records",
                    relationship.dependent_table.table,
                    child_ids.len()
                );
                queue.add_task(relationship.dependent_table.clone(), child_ids, level + 1);
                stats.relationships_processed += 1;
            }
        }

        queue.mark_completed(&table);

        if iteration > MAX_CASCADE_ITERATIONS {
            warn!("Reached maximum iterations ({MAX_CASCADE_ITERATIONS}). Stopping cascade.");
            break;
        }
    }

    stats.processing_time_seconds = timer.elapsed_seconds();
    stats.update_from_queue(&queue);

    info!("Cascade processing complete. {}", queue.summary());

    Ok(CascadeOutcome {
        operations: queue.all_operations(catalog),
        stats,
    })
}
