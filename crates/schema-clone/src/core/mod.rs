//! Core abstractions for foreign-key aware cloning.
//!
//! - [`identifier`]: case-insensitive table identities and identifier quoting
//! - [`schema`]: column, key and table definitions, traversal direction
//! - [`value`]: row values read from a source table
//! - [`traits`]: the metadata provider and statement generator seams
//!
//! Everything here is backend-neutral; `drivers` supplies the SQL Server,
//! PostgreSQL and in-memory implementations.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use identifier::TableIdentity;
pub use schema::{
    ColumnDefinition, DependencyDirection, ForeignKeyConstraint, KeyDefinition, TableDefinition,
};
pub use traits::{MetadataProvider, StatementGenerator};
pub use value::{Row, SqlValue};
