//! Foreign-key dependency graphs.
//!
//! - [`DependencyResolver`] walks foreign keys from a starting table in a
//!   given direction and records, for every table it reaches, the tables it
//!   directly depends on.
//! - [`topological_order`] turns any such mapping into a dependencies-first
//!   sequence.
//! - [`describe_tables`] and [`graph_for_tables`] fetch metadata for a known
//!   table set concurrently and build the graph among those tables only.
//!
//! The same closure + sort pair answers "what would be dropped with this
//! table" (descending), "what must exist before this table" (ascending) and
//! "in what order can this set be created".

mod discovery;
mod topo;

pub use discovery::{describe_tables, graph_for_tables};
pub use topo::{topological_order, CycleError, CyclePolicy};

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::core::{DependencyDirection, MetadataProvider, TableIdentity};
use crate::error::{CloneError, Result};

/// Mapping from each table to the tables it directly depends on.
///
/// Entries keep their insertion order so iteration and sorting are
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<TableIdentity>,
    edges: HashMap<TableIdentity, Vec<TableIdentity>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `table` unless it is already present. Returns whether it was inserted.
    pub fn insert(&mut self, table: TableIdentity, dependencies: Vec<TableIdentity>) -> bool {
        if self.edges.contains_key(&table) {
            return false;
        }
        self.order.push(table.clone());
        self.edges.insert(table, dependencies);
        true
    }

    /// Merge another graph; existing entries win.
    pub fn merge(&mut self, other: DependencyGraph) {
        let DependencyGraph { order, mut edges } = other;
        for table in order {
            if let Some(deps) = edges.remove(&table) {
                self.insert(table, deps);
            }
        }
    }

    pub fn contains(&self, table: &TableIdentity) -> bool {
        self.edges.contains_key(table)
    }

    /// Direct dependencies of `table`; empty for unknown tables.
    pub fn dependencies_of(&self, table: &TableIdentity) -> &[TableIdentity] {
        self.edges.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tables in discovery order.
    pub fn tables(&self) -> &[TableIdentity] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// (table, dependencies) pairs in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&TableIdentity, &[TableIdentity])> {
        self.order
            .iter()
            .map(move |t| (t, self.dependencies_of(t)))
    }

    /// Dependencies-first order over `items`, following this graph's edges.
    pub fn order_of(
        &self,
        items: &[TableIdentity],
        policy: CyclePolicy,
    ) -> std::result::Result<Vec<TableIdentity>, CycleError<TableIdentity>> {
        topological_order(items, |t| self.dependencies_of(t).to_vec(), policy)
    }

    /// Dependencies-first order over every table in the graph.
    pub fn topological_order(
        &self,
        policy: CyclePolicy,
    ) -> std::result::Result<Vec<TableIdentity>, CycleError<TableIdentity>> {
        self.order_of(&self.order, policy)
    }
}

impl From<CycleError<TableIdentity>> for CloneError {
    fn from(err: CycleError<TableIdentity>) -> Self {
        CloneError::CycleDetected {
            path: err.path.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Computes direction-scoped foreign-key closures against a metadata provider.
pub struct DependencyResolver<'a> {
    provider: &'a dyn MetadataProvider,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(provider: &'a dyn MetadataProvider) -> Self {
        Self { provider }
    }

    /// Every table reachable from `start` through foreign keys in `direction`,
    /// each mapped to its direct dependencies in that direction.
    ///
    /// With `scoped`, traversal stays inside `start`'s schema: keys whose
    /// other side lives elsewhere are ignored, so out-of-scope tables are
    /// neither recorded nor used as stepping stones. Each table is expanded
    /// once; self-references are not recorded.
    pub async fn resolve_referenced(
        &self,
        start: &TableIdentity,
        direction: DependencyDirection,
        scoped: bool,
    ) -> Result<DependencyGraph> {
        let direction = direction.validate()?;

        if !self.provider.table_exists(start).await? {
            return Err(CloneError::config(format!("Table {} does not exist", start)));
        }

        let scope = scoped.then(|| start.schema.clone());
        let mut graph = DependencyGraph::new();
        let mut discovered: HashSet<TableIdentity> = HashSet::new();
        let mut pending = vec![start.clone()];
        discovered.insert(start.clone());

        while let Some(table) = pending.pop() {
            let dependencies = self
                .direct_dependencies(&table, direction, scope.as_deref())
                .await?;

            debug!(
                "{} -> [{}]",
                table,
                dependencies
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            // Reverse so the first dependency is expanded next.
            for dep in dependencies.iter().rev() {
                if discovered.insert(dep.clone()) {
                    pending.push(dep.clone());
                }
            }

            graph.insert(table, dependencies);
        }

        Ok(graph)
    }

    /// Union of the closures of several start tables. Earlier roots win
    /// when the same table is reached twice.
    pub async fn resolve_all(
        &self,
        roots: &[TableIdentity],
        direction: DependencyDirection,
        scoped: bool,
    ) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for root in roots {
            // A root already reached is fully expanded.
            if graph.contains(root) {
                continue;
            }
            let closure = self.resolve_referenced(root, direction, scoped).await?;
            graph.merge(closure);
        }
        Ok(graph)
    }

    async fn direct_dependencies(
        &self,
        table: &TableIdentity,
        direction: DependencyDirection,
        scope: Option<&str>,
    ) -> Result<Vec<TableIdentity>> {
        let keys = self
            .provider
            .list_foreign_keys(table, direction, scope)
            .await?;

        let mut dependencies: Vec<TableIdentity> = Vec::new();
        for key in &keys {
            let Some(other) = key.other_side(table) else {
                continue;
            };
            if other == *table {
                continue;
            }
            if let Some(scope) = scope {
                if !other.in_schema(scope) {
                    continue;
                }
            }
            if !dependencies.contains(&other) {
                dependencies.push(other);
            }
        }

        Ok(dependencies)
    }
}
