//! Core traits the resolver and orchestrator are written against.
//!
//! - [`MetadataProvider`]: catalog reads plus the few side effects a clone
//!   pass performs against a connection
//! - [`StatementGenerator`]: dialect-specific SQL text for a table
//!
//! Both are implemented per backend in `drivers`.

use async_trait::async_trait;

use crate::error::Result;

use super::identifier::TableIdentity;
use super::schema::{DependencyDirection, KeyDefinition, TableDefinition};
use super::value::Row;

/// Catalog access and statement execution for one database connection.
///
/// Implementations never cache table definitions; every call re-queries
/// the catalog.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// All schema names known to the connection.
    async fn list_schemas(&self) -> Result<Vec<String>>;

    /// All base tables in a schema.
    async fn list_tables(&self, schema: &str) -> Result<Vec<TableIdentity>>;

    /// Columns and keys of a table, or `None` if it does not exist.
    async fn describe_table(&self, table: &TableIdentity) -> Result<Option<TableDefinition>>;

    /// Foreign keys touching `table` in the given direction.
    ///
    /// Ascending returns keys owned by `table`; descending returns keys of
    /// other tables referencing `table`. With `scope`, only keys whose other
    /// side lives in that schema are returned.
    async fn list_foreign_keys(
        &self,
        table: &TableIdentity,
        direction: DependencyDirection,
        scope: Option<&str>,
    ) -> Result<Vec<KeyDefinition>>;

    /// Check if a table exists.
    async fn table_exists(&self, table: &TableIdentity) -> Result<bool>;

    /// Create a schema.
    async fn create_schema(&self, schema: &str) -> Result<()>;

    /// Drop a table if it exists, refusing to cascade into referencing tables.
    async fn drop_table(&self, table: &TableIdentity) -> Result<()>;

    /// Execute a generated statement.
    async fn execute_statement(&self, sql: &str) -> Result<()>;

    /// Read every row of a table, in the column order of
    /// [`TableDefinition::ordered_columns`].
    async fn read_rows(&self, table: &TableDefinition) -> Result<Vec<Row>>;

    /// Stable identity of the underlying server and database
    /// (e.g. `mssql://host:1433/db`), used to detect same-connection clones.
    fn connection_id(&self) -> &str;

    /// Get the database type identifier (e.g., "mssql", "postgres").
    fn db_type(&self) -> &str;

    /// Schema used for unqualified table names.
    fn default_schema(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Dialect-specific statement text for cloning a table.
pub trait StatementGenerator: Send + Sync {
    /// Get the dialect identifier (e.g., "mssql", "postgres").
    fn name(&self) -> &str;

    /// A single self-contained statement that creates the table (columns,
    /// primary key, foreign keys) and inserts `rows`.
    fn build_create_and_populate(&self, table: &TableDefinition, rows: &[Row]) -> Result<String>;

    /// Idempotent drop statement.
    fn build_drop(&self, table: &TableIdentity) -> Result<String>;

    /// Truncate statement.
    fn build_truncate(&self, table: &TableIdentity) -> Result<String>;
}
