//! # schema-clone
//!
//! Foreign-key aware table cloning and backup.
//!
//! Given a set of root tables, the library computes the tables they depend
//! on through foreign keys, orders the set dependencies-first and copies it
//! to a target: another server, or another schema on the same server. Tables
//! are dropped at the target in reverse order and recreated with their rows
//! in forward order.
//!
//! - [`DependencyResolver`]: direction-scoped foreign key closures
//! - [`topological_order`]: dependencies-first ordering with a cycle policy
//! - [`CloneOrchestrator`]: the drop-and-copy pass
//!
//! ## Example
//!
//! ```rust,no_run
//! use schema_clone::{CloneOrchestrator, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> schema_clone::Result<()> {
//!     let config = Config::load("clone.yaml")?;
//!     let orchestrator = CloneOrchestrator::connect(&config).await?;
//!     let report = orchestrator
//!         .clone_tables(&config.clone, &CancellationToken::new())
//!         .await?;
//!     println!("Copied {} rows", report.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod graph;
pub mod orchestrator;

// Re-exports for convenient access
pub use config::{CloneConfiguration, Config, ConnectionConfig, DatabaseKind};
pub use crate::core::{
    DependencyDirection, MetadataProvider, StatementGenerator, TableDefinition, TableIdentity,
};
pub use drivers::MemoryCatalog;
pub use error::{CloneError, Phase, Result};
pub use graph::{topological_order, CycleError, CyclePolicy, DependencyGraph, DependencyResolver};
pub use orchestrator::{ClonePlan, CloneOrchestrator, CloneReport, SchemaRewriter};
