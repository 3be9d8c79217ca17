//! Database driver implementations.
//!
//! Each driver implements the core traits for one engine:
//!
//! - [`mssql`]: Microsoft SQL Server (Tiberius + bb8)
//! - [`postgres`]: PostgreSQL (tokio-postgres + deadpool-postgres)
//! - [`memory`]: in-process catalog for tests and offline planning
//!
//! [`connect`] picks the provider and generator for a connection config.

pub mod memory;
pub mod mssql;
pub mod postgres;

use std::sync::Arc;

pub use memory::MemoryCatalog;
pub use mssql::{MssqlGenerator, MssqlProvider};
pub use postgres::{PgGenerator, PgProvider, SslMode};

use crate::config::{ConnectionConfig, DatabaseKind};
use crate::core::{MetadataProvider, StatementGenerator};
use crate::error::Result;

/// A connected provider together with the generator for its dialect.
#[derive(Clone)]
pub struct Connection {
    pub provider: Arc<dyn MetadataProvider>,
    pub generator: Arc<dyn StatementGenerator>,
}

impl Connection {
    pub async fn close(&self) {
        self.provider.close().await;
    }
}

/// Statement generator for a database engine.
pub fn generator_for(kind: DatabaseKind) -> Arc<dyn StatementGenerator> {
    match kind {
        DatabaseKind::Mssql => Arc::new(MssqlGenerator::new()),
        DatabaseKind::Postgres => Arc::new(PgGenerator::new()),
    }
}

/// Open a pooled connection for `config`.
pub async fn connect(config: &ConnectionConfig) -> Result<Connection> {
    let kind = config.kind()?;
    let provider: Arc<dyn MetadataProvider> = match kind {
        DatabaseKind::Mssql => Arc::new(MssqlProvider::connect(config).await?),
        DatabaseKind::Postgres => Arc::new(PgProvider::connect(config).await?),
    };
    Ok(Connection {
        provider,
        generator: generator_for(kind),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_for_kind() {
        assert_eq!(generator_for(DatabaseKind::Mssql).name(), "mssql");
        assert_eq!(generator_for(DatabaseKind::Postgres).name(), "postgres");
    }
}
