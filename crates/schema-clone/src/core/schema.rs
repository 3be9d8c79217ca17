//! Schema and metadata types for tables, columns and keys.
//!
//! These types provide a database-agnostic representation of the catalog
//! records the resolver and the statement generators work from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::identifier::{same_name, TableIdentity};
use crate::error::{CloneError, Result};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,

    /// Ordinal position (1-based).
    pub ordinal_position: i32,

    /// Declared default expression, in the driver's native text form.
    pub default_value: Option<String>,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Data type (e.g., "int", "nvarchar", "timestamp with time zone").
    pub data_type: String,

    /// Maximum length for string/binary types (-1 for max).
    pub max_length: Option<i32>,

    /// Numeric precision.
    pub precision: Option<i32>,

    /// Numeric scale.
    pub scale: Option<i32>,

    /// Whether the column is an identity column.
    pub is_identity: bool,
}

impl ColumnDefinition {
    /// Plain nullable column with no length or precision.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal_position: i32) -> Self {
        Self {
            name: name.into(),
            ordinal_position,
            default_value: None,
            is_nullable: true,
            data_type: data_type.into(),
            max_length: None,
            precision: None,
            scale: None,
            is_identity: false,
        }
    }
}

/// One column of a primary or foreign key constraint.
///
/// Composite keys are represented by several entries sharing a constraint name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyDefinition {
    Primary {
        schema: String,
        table: String,
        column: String,
        constraint: String,
    },
    Foreign {
        schema: String,
        table: String,
        column: String,
        constraint: String,
        referenced_schema: String,
        referenced_table: String,
        referenced_column: String,
    },
}

impl KeyDefinition {
    /// Table that owns the constraint.
    pub fn owner(&self) -> TableIdentity {
        match self {
            KeyDefinition::Primary { schema, table, .. }
            | KeyDefinition::Foreign { schema, table, .. } => TableIdentity::new(schema, table),
        }
    }

    /// Table referenced by a foreign key; `None` for primary keys.
    pub fn referenced(&self) -> Option<TableIdentity> {
        match self {
            KeyDefinition::Primary { .. } => None,
            KeyDefinition::Foreign {
                referenced_schema,
                referenced_table,
                ..
            } => Some(TableIdentity::new(referenced_schema, referenced_table)),
        }
    }

    pub fn constraint(&self) -> &str {
        match self {
            KeyDefinition::Primary { constraint, .. }
            | KeyDefinition::Foreign { constraint, .. } => constraint,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            KeyDefinition::Primary { column, .. } | KeyDefinition::Foreign { column, .. } => column,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, KeyDefinition::Primary { .. })
    }

    /// The table on the other end of this key as seen from `from`.
    ///
    /// For a foreign key owned by `from` this is the referenced table; for a
    /// foreign key referencing `from` it is the owning table. Primary keys
    /// and keys not touching `from` have no other side.
    pub fn other_side(&self, from: &TableIdentity) -> Option<TableIdentity> {
        let referenced = self.referenced()?;
        let owner = self.owner();
        if owner == *from {
            Some(referenced)
        } else if referenced == *from {
            Some(owner)
        } else {
            None
        }
    }
}

/// A foreign key constraint with its columns grouped in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyConstraint {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced: TableIdentity,
    pub referenced_columns: Vec<String>,
}

/// A fully resolved table ready to be scripted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub identity: TableIdentity,
    pub columns: Vec<ColumnDefinition>,
    pub keys: Vec<KeyDefinition>,
}

impl TableDefinition {
    pub fn new(identity: TableIdentity) -> Self {
        Self {
            identity,
            columns: Vec::new(),
            keys: Vec::new(),
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        self.identity.to_string()
    }

    /// Primary key column names in key order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.keys
            .iter()
            .filter(|k| k.is_primary())
            .map(|k| k.column())
            .collect()
    }

    /// Name of the primary key constraint, if any.
    pub fn primary_key_name(&self) -> Option<&str> {
        self.keys
            .iter()
            .find(|k| k.is_primary())
            .map(|k| k.constraint())
    }

    /// Foreign keys owned by this table, grouped per constraint.
    pub fn foreign_key_constraints(&self) -> Vec<ForeignKeyConstraint> {
        let mut grouped: Vec<ForeignKeyConstraint> = Vec::new();

        for key in &self.keys {
            let KeyDefinition::Foreign {
                constraint,
                column,
                referenced_column,
                ..
            } = key
            else {
                continue;
            };
            if key.owner() != self.identity {
                continue;
            }

            match grouped.iter_mut().find(|g| same_name(&g.name, constraint)) {
                Some(existing) => {
                    existing.columns.push(column.clone());
                    existing.referenced_columns.push(referenced_column.clone());
                }
                None => grouped.push(ForeignKeyConstraint {
                    name: constraint.clone(),
                    columns: vec![column.clone()],
                    referenced: key.referenced().unwrap_or_else(|| self.identity.clone()),
                    referenced_columns: vec![referenced_column.clone()],
                }),
            }
        }

        grouped
    }

    /// Check if the table has an identity column.
    pub fn has_identity(&self) -> bool {
        self.columns.iter().any(|c| c.is_identity)
    }

    /// Columns sorted by ordinal position.
    pub fn ordered_columns(&self) -> Vec<&ColumnDefinition> {
        let mut cols: Vec<&ColumnDefinition> = self.columns.iter().collect();
        cols.sort_by_key(|c| c.ordinal_position);
        cols
    }
}

/// Direction in which foreign keys are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyDirection {
    /// No traversal. Rejected by the resolver.
    #[default]
    None,
    /// Tables this table's own foreign keys point to (its prerequisites).
    Ascending,
    /// Tables whose foreign keys point back to this table (its dependents).
    Descending,
    /// Both of the above.
    Both,
}

impl DependencyDirection {
    /// Reject the disabled direction.
    pub fn validate(self) -> Result<Self> {
        match self {
            DependencyDirection::None => Err(CloneError::config(
                "Dependency direction 'none' cannot be traversed; use ascending, descending or both",
            )),
            other => Ok(other),
        }
    }

    pub fn includes_ascending(self) -> bool {
        matches!(self, DependencyDirection::Ascending | DependencyDirection::Both)
    }

    pub fn includes_descending(self) -> bool {
        matches!(self, DependencyDirection::Descending | DependencyDirection::Both)
    }
}

impl fmt::Display for DependencyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyDirection::None => "none",
            DependencyDirection::Ascending => "ascending",
            DependencyDirection::Descending => "descending",
            DependencyDirection::Both => "both",
        };
        f.write_str(s)
    }
}

impl FromStr for DependencyDirection {
    type Err = CloneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(DependencyDirection::None),
            "ascending" | "asc" => Ok(DependencyDirection::Ascending),
            "descending" | "desc" => Ok(DependencyDirection::Descending),
            "both" => Ok(DependencyDirection::Both),
            other => Err(CloneError::config(format!(
                "Invalid direction '{}'. Valid values: none, ascending, descending, both",
                other
            ))),
        }
    }
}
