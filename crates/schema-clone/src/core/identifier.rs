//! Table identities and identifier quoting.
//!
//! [`TableIdentity`] is the key used by every graph and map in the crate. Its
//! equality, ordering and hash are case-insensitive over schema and name, so
//! `dbo.Orders` and `DBO.orders` are the same node.
//!
//! SQL identifiers cannot be bound as statement parameters, so generated DDL
//! quotes them with the helpers below after validating them for suspicious
//! patterns (null bytes, excessive length).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{CloneError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - SQL Server: 128 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Schema-qualified table name with case-insensitive identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableIdentity {
    /// Schema name, as reported by the catalog.
    pub schema: String,
    /// Table name, as reported by the catalog.
    pub name: String,
}

impl TableIdentity {
    /// Create an identity from schema and table name.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `table` or `schema.table`.
    ///
    /// A bare table name resolves against `default_schema`. Anything other
    /// than one or two non-empty dot-separated segments is rejected.
    /// Segments may be wrapped in `[...]` or `"..."`.
    pub fn parse(text: &str, default_schema: Option<&str>) -> Result<Self> {
        let segments: Vec<&str> = text.trim().split('.').collect();

        let identity = match segments.as_slice() {
            [name] => {
                let schema = default_schema.ok_or_else(|| {
                    CloneError::config(format!(
                        "Table '{}' has no schema and no default schema is configured",
                        text
                    ))
                })?;
                Self::new(schema, unquote(name))
            }
            [schema, name] => Self::new(unquote(schema), unquote(name)),
            _ => {
                return Err(CloneError::config(format!(
                    "Malformed table name '{}': expected 'table' or 'schema.table'",
                    text
                )))
            }
        };

        if identity.schema.is_empty() || identity.name.is_empty() {
            return Err(CloneError::config(format!(
                "Malformed table name '{}': empty schema or table segment",
                text
            )));
        }
        validate_identifier(&identity.schema)?;
        validate_identifier(&identity.name)?;

        Ok(identity)
    }

    /// Whether this table lives in `schema` (case-insensitive).
    pub fn in_schema(&self, schema: &str) -> bool {
        same_name(&self.schema, schema)
    }

    /// Same table name moved to another schema.
    pub fn with_schema(&self, schema: &str) -> Self {
        Self::new(schema, self.name.clone())
    }

    fn key(&self) -> (String, String) {
        (self.schema.to_lowercase(), self.name.to_lowercase())
    }
}

impl PartialEq for TableIdentity {
    fn eq(&self, other: &Self) -> bool {
        same_name(&self.schema, &other.schema) && same_name(&self.name, &other.name)
    }
}

impl Eq for TableIdentity {}

impl Hash for TableIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for TableIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Case-insensitive comparison of two catalog names.
pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

fn unquote(segment: &str) -> String {
    let s = segment.trim();
    let inner = if s.len() >= 2
        && ((s.starts_with('[') && s.ends_with(']')) || (s.starts_with('"') && s.ends_with('"')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    };
    inner.to_string()
}

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CloneError::config("Identifier cannot be empty"));
    }

    if name.contains('\0') {
        return Err(CloneError::config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CloneError::config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a SQL Server identifier using brackets.
///
/// Escapes closing brackets by doubling them and wraps in brackets.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(table: &TableIdentity) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(&table.schema)?, quote_pg(&table.name)?))
}

/// Qualify a SQL Server table name with schema.
pub fn qualify_mssql(table: &TableIdentity) -> Result<String> {
    Ok(format!(
        "{}.{}",
        quote_mssql(&table.schema)?,
        quote_mssql(&table.name)?
    ))
}
