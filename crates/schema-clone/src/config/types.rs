//! Configuration type definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CloneError;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection tables are read from.
    pub source: ConnectionConfig,

    /// Connection tables are written to. Omitted means the source connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ConnectionConfig>,

    /// Clone behavior.
    #[serde(default)]
    pub clone: CloneConfiguration,
}

impl Config {
    /// Target connection, falling back to the source.
    pub fn target_connection(&self) -> &ConnectionConfig {
        self.target.as_ref().unwrap_or(&self.source)
    }
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Mssql,
    Postgres,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Mssql => "mssql",
            DatabaseKind::Postgres => "postgres",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseKind::Mssql => 1433,
            DatabaseKind::Postgres => 5432,
        }
    }

    pub fn default_schema(&self) -> &'static str {
        match self {
            DatabaseKind::Mssql => "dbo",
            DatabaseKind::Postgres => "public",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseKind {
    type Err = CloneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mssql" | "sqlserver" | "sql_server" => Ok(DatabaseKind::Mssql),
            "postgres" | "postgresql" | "pg" => Ok(DatabaseKind::Postgres),
            other => Err(CloneError::config(format!(
                "Unknown database type: '{}'. Supported types: mssql, postgres",
                other
            ))),
        }
    }
}

/// Database connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database type ("mssql" or "postgres").
    #[serde(default = "default_mssql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 1433 for mssql, 5432 for postgres).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema for unqualified table names (default: dbo / public).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,

    /// Encrypt SQL Server connections (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the SQL Server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// PostgreSQL SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl ConnectionConfig {
    /// Parsed database type.
    pub fn kind(&self) -> crate::error::Result<DatabaseKind> {
        self.r#type.parse()
    }

    /// Configured port or the engine default.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.kind()) {
            (Some(port), _) => port,
            (None, Ok(kind)) => kind.default_port(),
            (None, Err(_)) => 0,
        }
    }

    /// Configured default schema or the engine default.
    pub fn effective_default_schema(&self) -> String {
        match (&self.default_schema, self.kind()) {
            (Some(schema), _) => schema.clone(),
            (None, Ok(kind)) => kind.default_schema().to_string(),
            (None, Err(_)) => String::new(),
        }
    }

    /// Identity of the server and database, e.g. `mssql://db01:1433/sales`.
    ///
    /// Two configurations with the same id address the same database.
    pub fn connection_id(&self) -> String {
        let kind = self
            .kind()
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|_| self.r#type.to_lowercase());
        format!(
            "{}://{}:{}/{}",
            kind,
            self.host.to_lowercase(),
            self.effective_port(),
            self.database.to_lowercase()
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("default_schema", &self.default_schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// What to clone and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneConfiguration {
    /// Schema tables are copied from. Must be set together with `target_schema`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_schema: Option<String>,

    /// Schema tables are copied into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,

    /// Root tables, as `table` or `schema.table`. Empty means every table of
    /// the source schema.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Add every table the roots reference, transitively.
    #[serde(default)]
    pub expand_foreign_keys: bool,

    /// Keep foreign key expansion inside each root's schema.
    #[serde(default)]
    pub scope_expansion_to_schema: bool,

    /// Create target schemas that do not exist yet.
    #[serde(default)]
    pub create_missing_schemas: bool,

    /// On a same-connection schema clone, leave tables of other schemas alone.
    #[serde(default)]
    pub skip_shared_tables: bool,

    /// Catalog queries in flight while describing a table set.
    #[serde(default = "default_discovery_concurrency")]
    pub discovery_concurrency: usize,
}

impl Default for CloneConfiguration {
    fn default() -> Self {
        Self {
            source_schema: None,
            target_schema: None,
            tables: Vec::new(),
            expand_foreign_keys: false,
            scope_expansion_to_schema: false,
            create_missing_schemas: false,
            skip_shared_tables: false,
            discovery_concurrency: default_discovery_concurrency(),
        }
    }
}

impl CloneConfiguration {
    /// Source and target schema when both are set.
    pub fn schema_pair(&self) -> Option<(&str, &str)> {
        match (&self.source_schema, &self.target_schema) {
            (Some(source), Some(target)) => Some((source.as_str(), target.as_str())),
            _ => None,
        }
    }
}

// Default value functions for serde
fn default_mssql() -> String {
    "mssql".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    4
}

fn default_discovery_concurrency() -> usize {
    4
}
