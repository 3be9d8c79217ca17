//! In-memory catalog.
//!
//! Holds table definitions and rows in process memory and records every
//! side effect, so the resolver and orchestrator can be exercised without a
//! database. Executed statements are logged but not interpreted.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::core::identifier::same_name;
use crate::core::{
    DependencyDirection, KeyDefinition, MetadataProvider, Row, TableDefinition, TableIdentity,
};
use crate::error::{CloneError, Result};

#[derive(Debug, Clone)]
struct MemoryTable {
    definition: TableDefinition,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct CatalogState {
    schemas: Vec<String>,
    tables: Vec<MemoryTable>,
    created_schemas: Vec<String>,
    dropped: Vec<TableIdentity>,
    executed: Vec<String>,
    failing_statements: Vec<String>,
    calls: usize,
}

impl CatalogState {
    fn find(&self, table: &TableIdentity) -> Option<&MemoryTable> {
        self.tables.iter().find(|t| t.definition.identity == *table)
    }

    fn add_schema(&mut self, schema: &str) {
        if !self.schemas.iter().any(|s| same_name(s, schema)) {
            self.schemas.push(schema.to_string());
        }
    }

    /// Foreign keys of other tables pointing at `table`.
    fn incoming_keys(&self, table: &TableIdentity) -> Vec<KeyDefinition> {
        self.tables
            .iter()
            .flat_map(|t| t.definition.keys.iter())
            .filter(|k| k.referenced().as_ref() == Some(table))
            .cloned()
            .collect()
    }
}

/// A [`MetadataProvider`] backed by process memory.
#[derive(Debug)]
pub struct MemoryCatalog {
    connection_id: String,
    db_type: String,
    default_schema: String,
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new(connection_id: impl Into<String>, default_schema: impl Into<String>) -> Self {
        let default_schema = default_schema.into();
        let mut state = CatalogState::default();
        state.add_schema(&default_schema);
        Self {
            connection_id: connection_id.into(),
            db_type: "memory".to_string(),
            default_schema,
            state: Mutex::new(state),
        }
    }

    /// Report a different engine name, e.g. to pair with a real driver's generator.
    pub fn with_db_type(mut self, db_type: impl Into<String>) -> Self {
        self.db_type = db_type.into();
        self
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.state_mut().add_schema(schema);
        self
    }

    /// Add an empty table; its schema is registered as well.
    pub fn with_table(self, definition: TableDefinition) -> Self {
        self.with_rows(definition, Vec::new())
    }

    pub fn with_rows(mut self, definition: TableDefinition, rows: Vec<Row>) -> Self {
        let state = self.state_mut();
        state.add_schema(&definition.identity.schema);
        state.tables.retain(|t| t.definition.identity != definition.identity);
        state.tables.push(MemoryTable { definition, rows });
        self
    }

    /// Make `execute_statement` fail for statements containing `pattern`.
    pub fn fail_statements_containing(mut self, pattern: impl Into<String>) -> Self {
        self.state_mut().failing_statements.push(pattern.into());
        self
    }

    /// Statements passed to `execute_statement`, in order.
    pub fn executed_statements(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Tables removed by `drop_table`, in order.
    pub fn dropped_tables(&self) -> Vec<TableIdentity> {
        self.lock().dropped.clone()
    }

    /// Schemas created through `create_schema`, in order.
    pub fn created_schemas(&self) -> Vec<String> {
        self.lock().created_schemas.clone()
    }

    /// Number of provider calls made so far.
    pub fn catalog_calls(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut CatalogState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state and count one provider call.
    fn call(&self) -> MutexGuard<'_, CatalogState> {
        let mut state = self.lock();
        state.calls += 1;
        state
    }
}

#[async_trait]
impl MetadataProvider for MemoryCatalog {
    async fn list_schemas(&self) -> Result<Vec<String>> {
        Ok(self.call().schemas.clone())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableIdentity>> {
        let state = self.call();
        Ok(state
            .tables
            .iter()
            .map(|t| t.definition.identity.clone())
            .filter(|t| t.in_schema(schema))
            .collect())
    }

    async fn describe_table(&self, table: &TableIdentity) -> Result<Option<TableDefinition>> {
        Ok(self.call().find(table).map(|t| t.definition.clone()))
    }

    async fn list_foreign_keys(
        &self,
        table: &TableIdentity,
        direction: DependencyDirection,
        scope: Option<&str>,
    ) -> Result<Vec<KeyDefinition>> {
        let direction = direction.validate()?;
        let state = self.call();

        let mut keys: Vec<KeyDefinition> = Vec::new();
        if direction.includes_ascending() {
            if let Some(found) = state.find(table) {
                keys.extend(
                    found
                        .definition
                        .keys
                        .iter()
                        .filter(|k| !k.is_primary() && k.owner() == *table)
                        .cloned(),
                );
            }
        }
        if direction.includes_descending() {
            for key in state.incoming_keys(table) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }

        if let Some(scope) = scope {
            keys.retain(|k| k.other_side(table).is_some_and(|other| other.in_schema(scope)));
        }

        Ok(keys)
    }

    async fn table_exists(&self, table: &TableIdentity) -> Result<bool> {
        Ok(self.call().find(table).is_some())
    }

    async fn create_schema(&self, schema: &str) -> Result<()> {
        let mut state = self.call();
        if state.schemas.iter().any(|s| same_name(s, schema)) {
            return Err(CloneError::backend(format!("Schema '{}' already exists", schema)));
        }
        state.add_schema(schema);
        state.created_schemas.push(schema.to_string());
        Ok(())
    }

    async fn drop_table(&self, table: &TableIdentity) -> Result<()> {
        let mut state = self.call();
        if state.find(table).is_none() {
            return Ok(());
        }

        let mut referenced_by: Vec<String> = Vec::new();
        for key in state.incoming_keys(table) {
            let owner = key.owner();
            if owner != *table {
                let name = owner.to_string();
                if !referenced_by.contains(&name) {
                    referenced_by.push(name);
                }
            }
        }
        if !referenced_by.is_empty() {
            return Err(CloneError::ReferentialConflict {
                table: table.to_string(),
                referenced_by,
            });
        }

        state.tables.retain(|t| t.definition.identity != *table);
        state.dropped.push(table.clone());
        Ok(())
    }

    async fn execute_statement(&self, sql: &str) -> Result<()> {
        let mut state = self.call();
        if let Some(pattern) = state.failing_statements.iter().find(|p| sql.contains(p.as_str())) {
            return Err(CloneError::backend(format!(
                "Statement rejected (matched '{}')",
                pattern
            )));
        }
        state.executed.push(sql.to_string());
        Ok(())
    }

    async fn read_rows(&self, table: &TableDefinition) -> Result<Vec<Row>> {
        self.call()
            .find(&table.identity)
            .map(|t| t.rows.clone())
            .ok_or_else(|| CloneError::backend(format!("Table {} not found", table.identity)))
    }

    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn db_type(&self) -> &str {
        &self.db_type
    }

    fn default_schema(&self) -> &str {
        &self.default_schema
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnDefinition, SqlValue};

    fn table(schema: &str, name: &str, references: Option<(&str, &str)>) -> TableDefinition {
        let mut def = TableDefinition::new(TableIdentity::new(schema, name));
        def.columns.push(ColumnDefinition::new("Id", "int", 1));
        if let Some((ref_schema, ref_table)) = references {
            def.keys.push(KeyDefinition::Foreign {
                schema: schema.into(),
                table: name.into(),
                column: "ParentId".into(),
                constraint: format!("FK_{}_{}", name, ref_table),
                referenced_schema: ref_schema.into(),
                referenced_table: ref_table.into(),
                referenced_column: "Id".into(),
            });
        }
        def
    }

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new("memory://test", "dbo")
            .with_rows(table("dbo", "Orders", None), vec![vec![SqlValue::I32(1)]])
            .with_table(table("dbo", "OrderLines", Some(("dbo", "Orders"))))
            .with_table(table("audit", "OrderLog", Some(("dbo", "Orders"))))
    }

    #[tokio::test]
    async fn test_lists_schemas_and_tables() {
        let catalog = catalog();
        assert_eq!(catalog.list_schemas().await.unwrap(), vec!["dbo", "audit"]);
        assert_eq!(catalog.list_tables("DBO").await.unwrap().len(), 2);
        assert!(catalog
            .table_exists(&TableIdentity::new("Audit", "orderlog"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_foreign_keys_by_direction_and_scope() {
        let catalog = catalog();
        let orders = TableIdentity::new("dbo", "Orders");

        let asc = catalog
            .list_foreign_keys(&orders, DependencyDirection::Ascending, None)
            .await
            .unwrap();
        assert!(asc.is_empty());

        let desc = catalog
            .list_foreign_keys(&orders, DependencyDirection::Descending, None)
            .await
            .unwrap();
        assert_eq!(desc.len(), 2);

        let scoped = catalog
            .list_foreign_keys(&orders, DependencyDirection::Descending, Some("dbo"))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].owner(), TableIdentity::new("dbo", "OrderLines"));
    }

    #[tokio::test]
    async fn test_drop_refuses_referenced_table() {
        let catalog = catalog();
        let err = catalog
            .drop_table(&TableIdentity::new("dbo", "Orders"))
            .await
            .unwrap_err();
        match err {
            CloneError::ReferentialConflict { table, referenced_by } => {
                assert_eq!(table, "dbo.Orders");
                assert_eq!(referenced_by, vec!["dbo.OrderLines", "audit.OrderLog"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        catalog
            .drop_table(&TableIdentity::new("dbo", "OrderLines"))
            .await
            .unwrap();
        catalog
            .drop_table(&TableIdentity::new("dbo", "Missing"))
            .await
            .unwrap();
        assert_eq!(catalog.dropped_tables(), vec![TableIdentity::new("dbo", "OrderLines")]);
    }

    #[tokio::test]
    async fn test_execute_records_and_fails_on_pattern() {
        let catalog = MemoryCatalog::new("memory://x", "dbo").fail_statements_containing("BOOM");
        catalog.execute_statement("SELECT 1").await.unwrap();
        assert!(catalog.execute_statement("SELECT BOOM").await.is_err());
        assert_eq!(catalog.executed_statements(), vec!["SELECT 1"]);
        assert_eq!(catalog.catalog_calls(), 2);
    }

    #[tokio::test]
    async fn test_create_schema_and_read_rows() {
        let catalog = catalog();
        catalog.create_schema("archive").await.unwrap();
        assert!(catalog.create_schema("ARCHIVE").await.is_err());
        assert_eq!(catalog.created_schemas(), vec!["archive"]);

        let def = catalog
            .describe_table(&TableIdentity::new("dbo", "Orders"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(catalog.read_rows(&def).await.unwrap(), vec![vec![SqlValue::I32(1)]]);
    }
}
