//! Concurrent metadata discovery for a known table set.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use super::DependencyGraph;
use crate::core::{MetadataProvider, TableDefinition, TableIdentity};
use crate::error::{CloneError, Result};

/// Describe `tables` with at most `concurrency` catalog queries in flight.
///
/// Results keep the input order. Every table must exist; the first failure
/// aborts the whole batch.
pub async fn describe_tables(
    provider: &dyn MetadataProvider,
    tables: &[TableIdentity],
    concurrency: usize,
) -> Result<Vec<TableDefinition>> {
    stream::iter(tables.iter().cloned())
        .map(|table| async move {
            provider
                .describe_table(&table)
                .await?
                .ok_or_else(|| CloneError::backend(format!("Table {} not found in catalog", table)))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

/// Graph over exactly `tables`, built from their own foreign keys.
///
/// Keys pointing outside the set and self-references are ignored. Every
/// definition is fetched before the graph is assembled.
pub async fn graph_for_tables(
    provider: &dyn MetadataProvider,
    tables: &[TableIdentity],
    concurrency: usize,
) -> Result<DependencyGraph> {
    let definitions = describe_tables(provider, tables, concurrency).await?;
    debug!("Described {} tables", definitions.len());

    let mut graph = DependencyGraph::new();
    for (table, definition) in tables.iter().zip(&definitions) {
        let mut dependencies: Vec<TableIdentity> = Vec::new();
        for fk in definition.foreign_key_constraints() {
            if fk.referenced == *table || !tables.contains(&fk.referenced) {
                continue;
            }
            if !dependencies.contains(&fk.referenced) {
                dependencies.push(fk.referenced);
            }
        }
        graph.insert(table.clone(), dependencies);
    }

    Ok(graph)
}
