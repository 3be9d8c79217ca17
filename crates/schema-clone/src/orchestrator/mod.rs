//! Clone orchestrator - coordinates a single drop-and-copy pass.

mod report;
mod rewrite;

pub use report::{ClonePlan, CloneReport, PlannedTable, TableOutcome, TableStatus};
pub use rewrite::SchemaRewriter;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{check_schema_pairing, CloneConfiguration, Config};
use crate::core::identifier::same_name;
use crate::core::{DependencyDirection, MetadataProvider, StatementGenerator, TableIdentity};
use crate::drivers;
use crate::error::{CloneError, Phase, Result};
use crate::graph::{graph_for_tables, CyclePolicy, DependencyResolver};

/// Clones a foreign-key closed set of tables from a source to a target.
///
/// A pass runs Validate, ExpandTables, ReconcileSchemas, then drops the
/// target tables in reverse dependency order and recreates them from the
/// source in dependency order. Steps run one at a time and nothing is rolled
/// back on failure.
pub struct CloneOrchestrator {
    source: Arc<dyn MetadataProvider>,
    target: Arc<dyn MetadataProvider>,
    generator: Arc<dyn StatementGenerator>,
}

impl CloneOrchestrator {
    /// `generator` must produce statements for the target's dialect.
    pub fn new(
        source: Arc<dyn MetadataProvider>,
        target: Arc<dyn MetadataProvider>,
        generator: Arc<dyn StatementGenerator>,
    ) -> Self {
        Self {
            source,
            target,
            generator,
        }
    }

    /// Connect to the source and target described by `config`.
    ///
    /// A target with the same connection identity as the source reuses the
    /// source pool.
    pub async fn connect(config: &Config) -> Result<Self> {
        info!("Connecting to source {}", config.source.connection_id());
        let source = drivers::connect(&config.source).await?;

        let target = match &config.target {
            Some(target) if target.connection_id() != config.source.connection_id() => {
                info!("Connecting to target {}", target.connection_id());
                drivers::connect(target).await?
            }
            _ => source.clone(),
        };

        Ok(Self::new(source.provider, target.provider, target.generator))
    }

    pub fn source(&self) -> &dyn MetadataProvider {
        self.source.as_ref()
    }

    pub fn target(&self) -> &dyn MetadataProvider {
        self.target.as_ref()
    }

    fn same_connection(&self) -> bool {
        self.source.connection_id() == self.target.connection_id()
    }

    /// Validate, expand and order the table set, and check target schemas,
    /// without changing anything.
    pub async fn plan(&self, config: &CloneConfiguration) -> Result<ClonePlan> {
        let roots = self.validate(config)?;
        let ordered = self.expand_tables(config, roots).await?;

        let same_connection = self.same_connection();
        let tables: Vec<PlannedTable> = ordered
            .into_iter()
            .map(|source| PlannedTable {
                target: target_identity(config, &source),
                shared: is_shared(config, same_connection, &source),
                source,
            })
            .collect();

        if same_connection {
            check_in_place_tables(&tables)?;
        }

        let schemas_to_create = self.missing_schemas(config, &tables).await?;

        Ok(ClonePlan {
            tables,
            schemas_to_create,
            same_connection,
        })
    }

    /// Run a full clone pass.
    ///
    /// `cancel` is checked before every schema, drop and copy step; a
    /// statement already sent to the target always runs to completion.
    pub async fn clone_tables(
        &self,
        config: &CloneConfiguration,
        cancel: &CancellationToken,
    ) -> Result<CloneReport> {
        let started_at = Utc::now();
        let start_time = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting clone run: {}", run_id);

        info!("Phase 1: Resolving tables");
        let plan = self.plan(config).await?;
        info!(
            "{} tables to clone: {}",
            plan.tables.len(),
            plan.copy_order()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        info!("Phase 2: Reconciling target schemas");
        let schemas_created = self.create_schemas(&plan, cancel).await?;

        info!("Phase 3: Dropping target tables");
        let tables_dropped = self.drop_phase(&plan, cancel).await?;

        info!("Phase 4: Copying tables");
        let tables = self.copy_phase(config, &plan, cancel).await?;

        let rows_copied = tables.iter().map(|t| t.rows).sum();
        let report = CloneReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
            schemas_created,
            tables_dropped,
            tables,
            rows_copied,
        };

        info!(
            "Clone complete: {} tables copied, {} skipped, {} rows in {:.1}s",
            report.tables_copied(),
            report.tables_skipped(),
            report.rows_copied,
            report.duration_seconds
        );

        Ok(report)
    }

    /// Close both connection pools.
    pub async fn close(&self) {
        self.source.close().await;
        if !self.same_connection() {
            self.target.close().await;
        }
    }

    /// Checks that need no backend contact. Returns the parsed root tables.
    fn validate(&self, config: &CloneConfiguration) -> Result<Vec<TableIdentity>> {
        let same_connection = self.same_connection();
        check_schema_pairing(config, same_connection)?;

        if !same_name(self.source.db_type(), self.target.db_type()) {
            return Err(CloneError::config(format!(
                "Source ({}) and target ({}) engines differ; cross-engine clones are not supported",
                self.source.db_type(),
                self.target.db_type()
            )));
        }

        if config.discovery_concurrency == 0 {
            return Err(CloneError::config(
                "clone.discovery_concurrency must be at least 1",
            ));
        }

        let default_schema = config
            .source_schema
            .as_deref()
            .unwrap_or_else(|| self.source.default_schema());

        let mut roots: Vec<TableIdentity> = Vec::with_capacity(config.tables.len());
        for name in &config.tables {
            let table = TableIdentity::parse(name, Some(default_schema))?;
            if !roots.contains(&table) {
                roots.push(table);
            }
        }

        if same_connection {
            debug!("Source and target share connection {}", self.source.connection_id());
        }

        Ok(roots)
    }

    /// Roots plus whatever expansion adds, dependencies first.
    async fn expand_tables(
        &self,
        config: &CloneConfiguration,
        roots: Vec<TableIdentity>,
    ) -> Result<Vec<TableIdentity>> {
        let roots = if roots.is_empty() {
            let Some(schema) = config.source_schema.as_deref() else {
                return Err(CloneError::config(
                    "No tables listed; set clone.tables or clone.source_schema",
                ));
            };
            let tables = self.source.list_tables(schema).await?;
            info!("No tables listed, cloning all {} tables of {}", tables.len(), schema);
            tables
        } else {
            roots
        };

        if roots.is_empty() {
            warn!("Nothing to clone");
            return Ok(Vec::new());
        }

        let graph = if config.expand_foreign_keys {
            DependencyResolver::new(self.source.as_ref())
                .resolve_all(
                    &roots,
                    DependencyDirection::Ascending,
                    config.scope_expansion_to_schema,
                )
                .await?
        } else {
            graph_for_tables(self.source.as_ref(), &roots, config.discovery_concurrency).await?
        };

        if graph.len() > roots.len() {
            debug!(
                "Foreign key expansion added {} tables",
                graph.len() - roots.len()
            );
        }

        let ordered = graph.topological_order(CyclePolicy::Strict)?;

        Ok(ordered)
    }

    /// Target schemas needed by `tables` that do not exist yet.
    ///
    /// Fails with `SchemaMissing` when one is absent and may not be created.
    async fn missing_schemas(
        &self,
        config: &CloneConfiguration,
        tables: &[PlannedTable],
    ) -> Result<Vec<String>> {
        let mut needed: Vec<&str> = Vec::new();
        if let Some((_, target_schema)) = config.schema_pair() {
            needed.push(target_schema);
        }
        for table in tables {
            let schema = table.target.schema.as_str();
            if !needed.iter().any(|s| same_name(s, schema)) {
                needed.push(schema);
            }
        }

        let existing = self.target.list_schemas().await?;
        let mut missing = Vec::new();
        for schema in needed {
            if existing.iter().any(|s| same_name(s, schema)) {
                continue;
            }
            if !config.create_missing_schemas {
                return Err(CloneError::SchemaMissing(schema.to_string()));
            }
            missing.push(schema.to_string());
        }

        Ok(missing)
    }

    async fn create_schemas(
        &self,
        plan: &ClonePlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut created = Vec::with_capacity(plan.schemas_to_create.len());
        for schema in &plan.schemas_to_create {
            check_cancelled(cancel)?;
            info!("Creating schema {}", schema);
            self.target
                .create_schema(schema)
                .await
                .map_err(|e| CloneError::step(Phase::Schema, schema, e))?;
            created.push(schema.clone());
        }
        Ok(created)
    }

    async fn drop_phase(&self, plan: &ClonePlan, cancel: &CancellationToken) -> Result<Vec<String>> {
        let mut dropped = Vec::new();
        for table in plan.tables.iter().rev() {
            check_cancelled(cancel)?;
            if table.shared {
                debug!("Not dropping shared table {}", table.target);
                continue;
            }
            debug!("Dropping {}", table.target);
            self.target
                .drop_table(&table.target)
                .await
                .map_err(|e| CloneError::step(Phase::Drop, &table.target, e))?;
            dropped.push(table.target.to_string());
        }
        Ok(dropped)
    }

    async fn copy_phase(
        &self,
        config: &CloneConfiguration,
        plan: &ClonePlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<TableOutcome>> {
        let rewrite = match config.schema_pair() {
            Some((source, target)) => Some((source, SchemaRewriter::new(source, target)?)),
            None => None,
        };

        let mut outcomes = Vec::with_capacity(plan.tables.len());
        for table in &plan.tables {
            check_cancelled(cancel)?;

            if table.shared {
                let exists = self
                    .target
                    .table_exists(&table.target)
                    .await
                    .map_err(|e| CloneError::step(Phase::Copy, &table.source, e))?;
                if exists {
                    warn!("Skipping shared table {}", table.source);
                    outcomes.push(TableOutcome {
                        source: table.source.to_string(),
                        target: table.target.to_string(),
                        status: TableStatus::SkippedShared,
                        rows: 0,
                    });
                    continue;
                }
            }

            let rewriter = rewrite
                .as_ref()
                .filter(|(source_schema, _)| table.source.in_schema(source_schema))
                .map(|(_, rewriter)| rewriter);

            let rows = self
                .copy_table(&table.source, rewriter)
                .await
                .map_err(|e| CloneError::step(Phase::Copy, &table.source, e))?;

            info!("Copied {} -> {} ({} rows)", table.source, table.target, rows);
            outcomes.push(TableOutcome {
                source: table.source.to_string(),
                target: table.target.to_string(),
                status: TableStatus::Copied,
                rows,
            });
        }
        Ok(outcomes)
    }

    /// Create and populate one table at the target. Returns the row count.
    async fn copy_table(
        &self,
        table: &TableIdentity,
        rewriter: Option<&SchemaRewriter>,
    ) -> Result<usize> {
        let definition = self
            .source
            .describe_table(table)
            .await?
            .ok_or_else(|| CloneError::backend(format!("Table {} not found at source", table)))?;

        let rows = self.source.read_rows(&definition).await?;
        let statement = self
            .generator
            .build_create_and_populate(&definition, &rows)?;
        let statement = match rewriter {
            Some(rewriter) => rewriter.rewrite(&statement),
            None => statement,
        };

        debug!("Executing statement for {} ({} bytes)", table, statement.len());
        self.target.execute_statement(&statement).await?;

        Ok(rows.len())
    }
}

/// Where `table` lands: the target schema for tables of the source schema,
/// otherwise the table itself.
fn target_identity(config: &CloneConfiguration, table: &TableIdentity) -> TableIdentity {
    match config.schema_pair() {
        Some((source, target)) if table.in_schema(source) => table.with_schema(target),
        _ => table.clone(),
    }
}

/// A table outside the source schema on a same-connection schema clone,
/// with skipping enabled.
fn is_shared(config: &CloneConfiguration, same_connection: bool, table: &TableIdentity) -> bool {
    if !config.skip_shared_tables || !same_connection {
        return false;
    }
    match config.schema_pair() {
        Some((source, _)) => !table.in_schema(source),
        None => false,
    }
}

/// On a single connection a table that would land on itself is the source
/// data; dropping it before the copy would destroy it.
fn check_in_place_tables(tables: &[PlannedTable]) -> Result<()> {
    let in_place: Vec<String> = tables
        .iter()
        .filter(|t| !t.shared && t.target == t.source)
        .map(|t| t.source.to_string())
        .collect();
    if in_place.is_empty() {
        return Ok(());
    }
    Err(CloneError::config(format!(
        "Tables outside the source schema would be dropped and recreated in place: {}. \
         Enable clone.skip_shared_tables or move them into the source schema",
        in_place.join(", ")
    )))
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        info!("Clone cancelled");
        return Err(CloneError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnDefinition, KeyDefinition, SqlValue, TableDefinition};
    use crate::drivers::{MemoryCatalog, MssqlGenerator};

    fn t(schema: &str, name: &str) -> TableIdentity {
        TableIdentity::new(schema, name)
    }

    fn table(schema: &str, name: &str, references: &[(&str, &str)]) -> TableDefinition {
        let mut def = TableDefinition::new(t(schema, name));
        let mut id = ColumnDefinition::new("Id", "int", 1);
        id.is_nullable = false;
        def.columns.push(id);
        def.keys.push(KeyDefinition::Primary {
            schema: schema.into(),
            table: name.into(),
            column: "Id".into(),
            constraint: format!("PK_{}", name),
        });
        for (i, (ref_schema, ref_table)) in references.iter().enumerate() {
            let column = format!("{}Id", ref_table);
            def.columns
                .push(ColumnDefinition::new(column.clone(), "int", i as i32 + 2));
            def.keys.push(KeyDefinition::Foreign {
                schema: schema.into(),
                table: name.into(),
                column,
                constraint: format!("FK_{}_{}", name, ref_table),
                referenced_schema: (*ref_schema).into(),
                referenced_table: (*ref_table).into(),
                referenced_column: "Id".into(),
            });
        }
        def
    }

    fn sales_db(connection_id: &str) -> MemoryCatalog {
        MemoryCatalog::new(connection_id, "dbo")
            .with_rows(
                table("dbo", "Orders", &[]),
                vec![vec![SqlValue::I32(1)], vec![SqlValue::I32(2)]],
            )
            .with_rows(
                table("dbo", "OrderLines", &[("dbo", "Orders")]),
                vec![vec![SqlValue::I32(10), SqlValue::I32(1)]],
            )
            .with_table(table("dbo", "Customers", &[]))
    }

    fn orchestrator(source: Arc<MemoryCatalog>, target: Arc<MemoryCatalog>) -> CloneOrchestrator {
        CloneOrchestrator::new(source, target, Arc::new(MssqlGenerator::new()))
    }

    fn schema_clone(tables: &[&str]) -> CloneConfiguration {
        CloneConfiguration {
            source_schema: Some("dbo".into()),
            target_schema: Some("archive".into()),
            tables: tables.iter().map(|s| s.to_string()).collect(),
            expand_foreign_keys: true,
            create_missing_schemas: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_self_clone_rejected_without_backend_contact() {
        let catalog = Arc::new(sales_db("memory://sales"));
        let orch = orchestrator(catalog.clone(), catalog.clone());
        let cancel = CancellationToken::new();

        let mut config = CloneConfiguration {
            tables: vec!["Orders".into()],
            ..Default::default()
        };
        let err = orch.clone_tables(&config, &cancel).await.unwrap_err();
        assert!(matches!(err, CloneError::InvalidConfiguration(_)));

        config.source_schema = Some("dbo".into());
        config.target_schema = Some("DBO".into());
        let err = orch.clone_tables(&config, &cancel).await.unwrap_err();
        assert!(matches!(err, CloneError::InvalidConfiguration(_)));

        assert_eq!(catalog.catalog_calls(), 0);
    }

    #[tokio::test]
    async fn test_half_configured_schemas_rejected() {
        let source = Arc::new(sales_db("memory://sales"));
        let target = Arc::new(MemoryCatalog::new("memory://backup", "dbo"));
        let orch = orchestrator(source.clone(), target.clone());

        let config = CloneConfiguration {
            source_schema: Some("dbo".into()),
            tables: vec!["Orders".into()],
            ..Default::default()
        };
        let err = orch.plan(&config).await.unwrap_err();
        assert!(matches!(err, CloneError::InvalidConfiguration(_)));
        assert_eq!(source.catalog_calls() + target.catalog_calls(), 0);
    }

    #[tokio::test]
    async fn test_cross_engine_rejected() {
        let source = Arc::new(sales_db("memory://sales").with_db_type("mssql"));
        let target = Arc::new(MemoryCatalog::new("memory://backup", "public").with_db_type("postgres"));
        let orch = orchestrator(source, target);

        let config = CloneConfiguration {
            tables: vec!["Orders".into()],
            ..Default::default()
        };
        let err = orch.plan(&config).await.unwrap_err();
        assert!(err.to_string().contains("differ"));
    }

    #[tokio::test]
    async fn test_malformed_root_rejected() {
        let source = Arc::new(sales_db("memory://sales"));
        let target = Arc::new(MemoryCatalog::new("memory://backup", "dbo"));
        let orch = orchestrator(source.clone(), target);

        let config = CloneConfiguration {
            tables: vec!["a.b.c".into()],
            ..Default::default()
        };
        assert!(matches!(
            orch.plan(&config).await.unwrap_err(),
            CloneError::InvalidConfiguration(_)
        ));
        assert_eq!(source.catalog_calls(), 0);
    }

    #[tokio::test]
    async fn test_orders_before_order_lines() {
        let source = Arc::new(sales_db("memory://sales"));
        // Stale copies at the target that must be replaced.
        let target = Arc::new(
            MemoryCatalog::new("memory://backup", "dbo")
                .with_table(table("dbo", "Orders", &[]))
                .with_table(table("dbo", "OrderLines", &[("dbo", "Orders")])),
        );
        let orch = orchestrator(source, target.clone());

        let config = CloneConfiguration {
            tables: vec!["OrderLines".into()],
            expand_foreign_keys: true,
            ..Default::default()
        };
        let report = orch
            .clone_tables(&config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            target.dropped_tables(),
            vec![t("dbo", "OrderLines"), t("dbo", "Orders")]
        );
        let statements = target.executed_statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE [dbo].[Orders]"));
        assert!(statements[1].starts_with("CREATE TABLE [dbo].[OrderLines]"));
        assert!(statements[1].contains("REFERENCES [dbo].[Orders] ([Id])"));

        assert_eq!(report.tables_copied(), 2);
        assert_eq!(report.rows_copied, 3);
        assert_eq!(report.tables_dropped, vec!["dbo.OrderLines", "dbo.Orders"]);
        assert_eq!(report.tables[0].source, "dbo.Orders");
    }

    #[tokio::test]
    async fn test_without_expansion_only_roots_are_cloned() {
        let source = Arc::new(sales_db("memory://sales"));
        let target = Arc::new(MemoryCatalog::new("memory://backup", "dbo"));
        let orch = orchestrator(source, target);

        let config = CloneConfiguration {
            tables: vec!["OrderLines".into(), "Orders".into()],
            ..Default::default()
        };
        let plan = orch.plan(&config).await.unwrap();
        assert_eq!(plan.copy_order(), vec![t("dbo", "Orders"), t("dbo", "OrderLines")]);

        let config = CloneConfiguration {
            tables: vec!["OrderLines".into()],
            ..Default::default()
        };
        let plan = orch.plan(&config).await.unwrap();
        assert_eq!(plan.copy_order(), vec![t("dbo", "OrderLines")]);
    }

    #[tokio::test]
    async fn test_schema_clone_rewrites_qualifiers() {
        let notes = table("dbo", "Notes", &[("sales", "Regions")]);
        let catalog = Arc::new(
            sales_db("memory://sales")
                .with_table(table("sales", "Regions", &[]))
                .with_rows(notes, vec![vec![SqlValue::I32(1), SqlValue::Text("see dbo.Orders".into())]]),
        );
        let orch = orchestrator(catalog.clone(), catalog.clone());

        let mut config = schema_clone(&["OrderLines", "Notes"]);
        config.scope_expansion_to_schema = true;
        let report = orch
            .clone_tables(&config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(catalog.created_schemas(), vec!["archive"]);
        assert_eq!(report.schemas_created, vec!["archive"]);

        let statements = catalog.executed_statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE TABLE [archive].[Orders]"));
        assert!(statements[1].contains("REFERENCES [archive].[Orders]"));
        assert!(statements[2].starts_with("CREATE TABLE [archive].[Notes]"));
        // Other schemas and literals keep their text.
        assert!(statements[2].contains("REFERENCES [sales].[Regions]"));
        assert!(statements[2].contains("N'see dbo.Orders'"));
        assert!(statements.iter().all(|s| !s.contains("[dbo].")));

        assert_eq!(report.tables[0].target, "archive.Orders");
    }

    #[tokio::test]
    async fn test_skip_shared_never_touches_foreign_schema() {
        let catalog = Arc::new(
            MemoryCatalog::new("memory://shop", "dbo")
                .with_table(table("ref", "Categories", &[]))
                .with_table(table("dbo", "Products", &[("ref", "Categories")])),
        );
        let orch = orchestrator(catalog.clone(), catalog.clone());

        let mut config = schema_clone(&["Products"]);
        config.skip_shared_tables = true;

        let plan = orch.plan(&config).await.unwrap();
        assert_eq!(plan.shared_tables(), vec![t("ref", "Categories")]);
        assert_eq!(plan.drop_order(), vec![t("archive", "Products")]);

        let report = orch
            .clone_tables(&config, &CancellationToken::new())
            .await
            .unwrap();

        assert!(catalog.dropped_tables().is_empty());
        let statements = catalog.executed_statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("CREATE TABLE [archive].[Products]"));
        assert!(statements[0].contains("REFERENCES [ref].[Categories]"));
        assert_eq!(report.tables[0].status, TableStatus::SkippedShared);
        assert_eq!(report.tables_skipped(), 1);
    }

    #[tokio::test]
    async fn test_shared_table_rejected_when_skipping_disabled() {
        let catalog = Arc::new(
            MemoryCatalog::new("memory://shop", "dbo")
                .with_table(table("ref", "Categories", &[]))
                .with_table(table("dbo", "Products", &[("ref", "Categories")])),
        );
        let orch = orchestrator(catalog.clone(), catalog.clone());

        let err = orch
            .clone_tables(&schema_clone(&["Products"]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CloneError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("ref.Categories"));
        assert_eq!(err.exit_code(), 2);
        assert!(catalog.dropped_tables().is_empty());
        assert!(catalog.executed_statements().is_empty());
        assert!(catalog.created_schemas().is_empty());
    }

    #[tokio::test]
    async fn test_root_outside_source_schema_keeps_source_data() {
        let catalog = Arc::new(MemoryCatalog::new("memory://shop", "dbo").with_rows(
            table("ref", "Lookup", &[]),
            vec![vec![SqlValue::I32(1)]],
        ));
        let orch = orchestrator(catalog.clone(), catalog.clone());

        let config = CloneConfiguration {
            source_schema: Some("dbo".into()),
            target_schema: Some("archive".into()),
            tables: vec!["ref.Lookup".into()],
            ..Default::default()
        };
        let err = orch.plan(&config).await.unwrap_err();
        assert!(matches!(err, CloneError::InvalidConfiguration(_)));

        let err = orch
            .clone_tables(&config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::InvalidConfiguration(_)));

        assert!(catalog.dropped_tables().is_empty());
        assert!(catalog.executed_statements().is_empty());
        assert!(catalog.table_exists(&t("ref", "Lookup")).await.unwrap());
        let lookup = catalog
            .describe_table(&t("ref", "Lookup"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(catalog.read_rows(&lookup).await.unwrap().len(), 1);

        // With skipping enabled the same root is left in place.
        let config = CloneConfiguration {
            skip_shared_tables: true,
            create_missing_schemas: true,
            ..config
        };
        let report = orch
            .clone_tables(&config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.tables_skipped(), 1);
        assert!(catalog.dropped_tables().is_empty());
        assert!(catalog.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_skip_shared_ignored_across_connections() {
        let source = Arc::new(
            MemoryCatalog::new("memory://shop", "dbo")
                .with_rows(table("ref", "Categories", &[]), vec![vec![SqlValue::I32(1)]])
                .with_table(table("dbo", "Products", &[("ref", "Categories")])),
        );
        let target = Arc::new(
            MemoryCatalog::new("memory://backup", "dbo")
                .with_schema("archive")
                .with_table(table("ref", "Categories", &[])),
        );
        let orch = orchestrator(source.clone(), target.clone());

        let mut config = schema_clone(&["Products"]);
        config.skip_shared_tables = true;

        let plan = orch.plan(&config).await.unwrap();
        assert!(!plan.same_connection);
        assert!(plan.shared_tables().is_empty());

        let report = orch
            .clone_tables(&config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(target.dropped_tables(), vec![t("ref", "Categories")]);
        let statements = target.executed_statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE [ref].[Categories]"));
        assert!(statements[1].starts_with("CREATE TABLE [archive].[Products]"));
        assert!(statements[1].contains("REFERENCES [ref].[Categories]"));
        assert_eq!(report.tables_copied(), 2);
        assert_eq!(report.tables_skipped(), 0);
        assert!(source.dropped_tables().is_empty());
        assert!(source.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_drop_referenced_from_outside_the_pass() {
        let source = Arc::new(sales_db("memory://sales"));
        let target = Arc::new(
            MemoryCatalog::new("memory://backup", "dbo")
                .with_table(table("archive", "Orders", &[]))
                .with_table(table("archive", "Invoices", &[("archive", "Orders")])),
        );
        let orch = orchestrator(source, target.clone());

        let err = orch
            .clone_tables(&schema_clone(&["Orders"]), &CancellationToken::new())
            .await
            .unwrap_err();

        match &err {
            CloneError::Step { phase, table, .. } => {
                assert_eq!(*phase, Phase::Drop);
                assert_eq!(table, "archive.Orders");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(err.root_cause(), CloneError::ReferentialConflict { .. }));
        assert_eq!(err.exit_code(), 5);
        assert!(target.dropped_tables().is_empty());
        assert!(target.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_missing_schema_without_create() {
        let catalog = Arc::new(sales_db("memory://sales"));
        let orch = orchestrator(catalog.clone(), catalog.clone());

        let mut config = schema_clone(&["Orders"]);
        config.create_missing_schemas = false;

        let err = orch
            .clone_tables(&config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::SchemaMissing(ref s) if s == "archive"));
        assert!(catalog.executed_statements().is_empty());
        assert!(catalog.dropped_tables().is_empty());
    }

    #[tokio::test]
    async fn test_plan_has_no_side_effects() {
        let catalog = Arc::new(sales_db("memory://sales"));
        let orch = orchestrator(catalog.clone(), catalog.clone());

        let plan = orch.plan(&schema_clone(&["OrderLines"])).await.unwrap();
        assert_eq!(plan.schemas_to_create, vec!["archive"]);
        assert_eq!(plan.copy_order(), vec![t("dbo", "Orders"), t("dbo", "OrderLines")]);
        assert_eq!(
            plan.drop_order(),
            vec![t("archive", "OrderLines"), t("archive", "Orders")]
        );
        assert!(plan.same_connection);
        assert!(catalog.created_schemas().is_empty());
        assert!(catalog.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_whole_schema_when_no_tables_listed() {
        let catalog = Arc::new(sales_db("memory://sales").with_table(table("sales", "Regions", &[])));
        let orch = orchestrator(catalog.clone(), catalog);

        let plan = orch.plan(&schema_clone(&[])).await.unwrap();
        let order = plan.copy_order();
        assert_eq!(order.len(), 3);
        assert!(!order.contains(&t("sales", "Regions")));
        let orders = order.iter().position(|x| *x == t("dbo", "Orders"));
        let lines = order.iter().position(|x| *x == t("dbo", "OrderLines"));
        assert!(orders < lines);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let catalog = Arc::new(sales_db("memory://sales"));
        let orch = orchestrator(catalog.clone(), catalog.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orch
            .clone_tables(&schema_clone(&["OrderLines"]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::Cancelled));
        assert_eq!(err.exit_code(), 130);
        assert!(catalog.created_schemas().is_empty());
        assert!(catalog.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_copy_failure_keeps_earlier_work() {
        let source = Arc::new(sales_db("memory://sales"));
        let target = Arc::new(
            MemoryCatalog::new("memory://backup", "dbo").fail_statements_containing("[OrderLines]"),
        );
        let orch = orchestrator(source, target.clone());

        let config = CloneConfiguration {
            tables: vec!["OrderLines".into()],
            expand_foreign_keys: true,
            ..Default::default()
        };
        let err = orch
            .clone_tables(&config, &CancellationToken::new())
            .await
            .unwrap_err();

        match &err {
            CloneError::Step { phase, table, source } => {
                assert_eq!(*phase, Phase::Copy);
                assert_eq!(table, "dbo.OrderLines");
                assert!(matches!(**source, CloneError::Backend(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.format_detailed().contains("Caused by"));

        let statements = target.executed_statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("CREATE TABLE [dbo].[Orders]"));
    }

    #[tokio::test]
    async fn test_cycle_is_fatal() {
        let source = Arc::new(
            MemoryCatalog::new("memory://cyclic", "dbo")
                .with_table(table("dbo", "A", &[("dbo", "B")]))
                .with_table(table("dbo", "B", &[("dbo", "A")])),
        );
        let target = Arc::new(MemoryCatalog::new("memory://backup", "dbo"));
        let orch = orchestrator(source, target.clone());

        let config = CloneConfiguration {
            tables: vec!["A".into()],
            expand_foreign_keys: true,
            ..Default::default()
        };
        let err = orch
            .clone_tables(&config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::CycleDetected { .. }));
        assert_eq!(err.exit_code(), 3);
        assert!(target.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_table() {
        let source = Arc::new(sales_db("memory://sales"));
        let target = Arc::new(MemoryCatalog::new("memory://backup", "dbo"));
        let orch = orchestrator(source, target);

        let config = CloneConfiguration {
            tables: vec!["Invoices".into()],
            expand_foreign_keys: true,
            ..Default::default()
        };
        let err = orch.plan(&config).await.unwrap_err();
        assert!(err.to_string().contains("dbo.Invoices"));
    }
}
