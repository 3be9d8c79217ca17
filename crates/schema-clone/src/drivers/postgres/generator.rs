//! PostgreSQL statement generation.

use chrono::SecondsFormat;

use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::value::quote_literal;
use crate::core::{ColumnDefinition, Row, SqlValue, StatementGenerator, TableDefinition, TableIdentity};
use crate::error::{CloneError, Result};

/// Rows per INSERT statement.
const ROWS_PER_INSERT: usize = 1000;

/// [`StatementGenerator`] producing PostgreSQL scripts.
#[derive(Debug, Clone, Default)]
pub struct PgGenerator;

impl PgGenerator {
    pub fn new() -> Self {
        Self
    }

    fn column_definition(&self, col: &ColumnDefinition) -> Result<String> {
        let mut def = format!("{} {}", quote_pg(&col.name)?, format_pg_type(col));
        if col.is_identity {
            def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        if !col.is_nullable {
            def.push_str(" NOT NULL");
        }
        // Sequence defaults point at objects that are not cloned.
        if let Some(default) = col
            .default_value
            .as_deref()
            .filter(|d| !d.trim().is_empty() && !d.contains("nextval("))
        {
            if !col.is_identity {
                def.push_str(" DEFAULT ");
                def.push_str(default);
            }
        }
        Ok(def)
    }
}

impl StatementGenerator for PgGenerator {
    fn name(&self) -> &str {
        "postgres"
    }

    fn build_create_and_populate(&self, table: &TableDefinition, rows: &[Row]) -> Result<String> {
        let qualified = qualify_pg(&table.identity)?;
        let columns = table.ordered_columns();

        let mut parts = columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect::<Result<Vec<_>>>()?;

        let pk_columns = table.primary_key_columns();
        if !pk_columns.is_empty() {
            let name = table
                .primary_key_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}_pkey", table.identity.name));
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                quote_pg(&name)?,
                quote_list(&pk_columns)?
            ));
        }
        for fk in table.foreign_key_constraints() {
            parts.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_pg(&fk.name)?,
                quote_list(&fk.columns)?,
                qualify_pg(&fk.referenced)?,
                quote_list(&fk.referenced_columns)?
            ));
        }

        let mut script = vec![format!(
            "CREATE TABLE {} (\n    {}\n);",
            qualified,
            parts.join(",\n    ")
        )];

        let column_list = quote_list(&columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>())?;
        let overriding = if table.has_identity() {
            " OVERRIDING SYSTEM VALUE"
        } else {
            ""
        };

        for chunk in rows.chunks(ROWS_PER_INSERT) {
            let mut groups = Vec::with_capacity(chunk.len());
            for row in chunk {
                if row.len() != columns.len() {
                    return Err(CloneError::backend(format!(
                        "Row for {} has {} values, expected {}",
                        table.identity,
                        row.len(),
                        columns.len()
                    )));
                }
                let values = row.iter().map(pg_literal).collect::<Result<Vec<_>>>()?;
                groups.push(format!("({})", values.join(", ")));
            }
            script.push(format!(
                "INSERT INTO {} ({}){} VALUES\n    {};",
                qualified,
                column_list,
                overriding,
                groups.join(",\n    ")
            ));
        }

        Ok(script.join("\n"))
    }

    fn build_drop(&self, table: &TableIdentity) -> Result<String> {
        Ok(format!("DROP TABLE IF EXISTS {} RESTRICT;", qualify_pg(table)?))
    }

    fn build_truncate(&self, table: &TableIdentity) -> Result<String> {
        Ok(format!("TRUNCATE TABLE {};", qualify_pg(table)?))
    }
}

fn quote_list<S: AsRef<str>>(names: &[S]) -> Result<String> {
    Ok(names
        .iter()
        .map(|n| quote_pg(n.as_ref()))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// Render an `information_schema` data type with its modifiers.
fn format_pg_type(col: &ColumnDefinition) -> String {
    let data_type = col.data_type.as_str();
    match data_type.to_lowercase().as_str() {
        "character varying" | "varchar" | "character" | "char" | "bit" | "bit varying" => {
            match col.max_length {
                Some(len) if len > 0 => format!("{}({})", data_type, len),
                _ => data_type.to_string(),
            }
        }
        "numeric" | "decimal" => match (col.precision, col.scale) {
            (Some(p), Some(s)) if p > 0 => format!("{}({}, {})", data_type, p, s),
            (Some(p), None) if p > 0 => format!("{}({})", data_type, p),
            _ => data_type.to_string(),
        },
        // information_schema reports arrays and domains generically
        "array" | "user-defined" => "text".to_string(),
        _ => data_type.to_string(),
    }
}

/// Render a value as a PostgreSQL literal.
fn pg_literal(value: &SqlValue) -> Result<String> {
    let literal = match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
        SqlValue::I16(v) => v.to_string(),
        SqlValue::I32(v) => v.to_string(),
        SqlValue::I64(v) => v.to_string(),
        SqlValue::F32(v) if v.is_finite() => v.to_string(),
        SqlValue::F64(v) if v.is_finite() => v.to_string(),
        SqlValue::F32(v) => quote_literal(&v.to_string()),
        SqlValue::F64(v) => quote_literal(&v.to_string()),
        SqlValue::Text(s) => quote_literal(s),
        SqlValue::Bytes(b) => format!("'\\x{}'::bytea", hex::encode(b)),
        SqlValue::Uuid(u) => quote_literal(&u.to_string()),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::DateTime(dt) => quote_literal(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::DateTimeOffset(dt) => {
            quote_literal(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
        }
        SqlValue::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => quote_literal(&t.format("%H:%M:%S%.f").to_string()),
    };
    Ok(literal)
}
