//! Configuration validation.

use super::{CloneConfiguration, Config, ConnectionConfig};
use crate::core::identifier::{same_name, validate_identifier};
use crate::core::TableIdentity;
use crate::drivers::SslMode;
use crate::error::{CloneError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("source", &config.source)?;
    if let Some(target) = &config.target {
        validate_connection("target", target)?;
        if config.source.kind()? != target.kind()? {
            return Err(CloneError::config(format!(
                "source.type '{}' and target.type '{}' differ; cloning between engines is not supported",
                config.source.r#type, target.r#type
            )));
        }
    }

    let same_connection =
        config.source.connection_id() == config.target_connection().connection_id();
    check_schema_pairing(&config.clone, same_connection)?;

    if config.clone.discovery_concurrency == 0 {
        return Err(CloneError::config(
            "clone.discovery_concurrency must be at least 1",
        ));
    }

    let default_schema = config
        .clone
        .source_schema
        .clone()
        .unwrap_or_else(|| config.source.effective_default_schema());
    for table in &config.clone.tables {
        TableIdentity::parse(table, Some(&default_schema))?;
    }

    Ok(())
}

/// Schema pairing rules shared by config loading and the orchestrator.
///
/// Source and target schema are set together or not at all. A clone onto the
/// same connection needs two distinct schemas.
pub fn check_schema_pairing(clone: &CloneConfiguration, same_connection: bool) -> Result<()> {
    match (&clone.source_schema, &clone.target_schema) {
        (Some(_), None) | (None, Some(_)) => Err(CloneError::config(
            "clone.source_schema and clone.target_schema must be set together",
        )),
        (Some(source), Some(target)) => {
            validate_identifier(source)?;
            validate_identifier(target)?;
            if same_connection && same_name(source, target) {
                return Err(CloneError::config(format!(
                    "Cannot clone schema '{}' onto itself on the same connection",
                    source
                )));
            }
            Ok(())
        }
        (None, None) if same_connection => Err(CloneError::config(
            "Source and target are the same connection; set clone.source_schema and clone.target_schema",
        )),
        (None, None) => Ok(()),
    }
}

fn validate_connection(side: &str, conn: &ConnectionConfig) -> Result<()> {
    if conn.host.is_empty() {
        return Err(CloneError::config(format!("{}.host is required", side)));
    }
    if conn.database.is_empty() {
        return Err(CloneError::config(format!("{}.database is required", side)));
    }
    if conn.user.is_empty() {
        return Err(CloneError::config(format!("{}.user is required", side)));
    }
    conn.kind()
        .map_err(|e| CloneError::config(format!("{}.type: {}", side, e)))?;
    SslMode::parse(&conn.ssl_mode)?;
    if conn.max_connections == 0 {
        return Err(CloneError::config(format!(
            "{}.max_connections must be at least 1",
            side
        )));
    }
    Ok(())
}
