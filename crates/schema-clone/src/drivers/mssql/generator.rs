//! T-SQL statement generation.

use chrono::SecondsFormat;

use crate::core::identifier::{qualify_mssql, quote_mssql};
use crate::core::value::quote_literal;
use crate::core::{ColumnDefinition, Row, SqlValue, StatementGenerator, TableDefinition, TableIdentity};
use crate::error::{CloneError, Result};

/// SQL Server caps a table value constructor at 1000 rows.
const MAX_ROWS_PER_INSERT: usize = 1000;

/// [`StatementGenerator`] producing SQL Server batches.
#[derive(Debug, Clone, Default)]
pub struct MssqlGenerator;

impl MssqlGenerator {
    pub fn new() -> Self {
        Self
    }

    fn column_definition(&self, col: &ColumnDefinition) -> Result<String> {
        let mut def = format!("{} {}", quote_mssql(&col.name)?, format_mssql_type(col));
        if col.is_identity {
            def.push_str(" IDENTITY(1,1)");
        }
        def.push_str(if col.is_nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = col.default_value.as_deref().filter(|d| !d.trim().is_empty()) {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        Ok(def)
    }

    fn create_table(&self, table: &TableDefinition) -> Result<String> {
        let mut parts = table
            .ordered_columns()
            .into_iter()
            .map(|c| self.column_definition(c))
            .collect::<Result<Vec<_>>>()?;

        let pk_columns = table.primary_key_columns();
        if !pk_columns.is_empty() {
            let name = table
                .primary_key_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("PK_{}", table.identity.name));
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                quote_mssql(&name)?,
                quote_list(&pk_columns)?
            ));
        }

        for fk in table.foreign_key_constraints() {
            parts.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_mssql(&fk.name)?,
                quote_list(&fk.columns)?,
                qualify_mssql(&fk.referenced)?,
                quote_list(&fk.referenced_columns)?
            ));
        }

        Ok(format!(
            "CREATE TABLE {} (\n    {}\n);",
            qualify_mssql(&table.identity)?,
            parts.join(",\n    ")
        ))
    }

    fn insert_rows(&self, table: &TableDefinition, rows: &[Row]) -> Result<Vec<String>> {
        let qualified = qualify_mssql(&table.identity)?;
        let columns = table.ordered_columns();
        let column_list = quote_list(&columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>())?;

        let mut statements = Vec::new();
        for chunk in rows.chunks(MAX_ROWS_PER_INSERT) {
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
                let values = row.iter().map(mssql_literal).collect::<Result<Vec<_>>>()?;
                groups.push(format!("({})", values.join(", ")));
            }
            statements.push(format!(
                "INSERT INTO {} ({}) VALUES\n    {};",
                qualified,
                column_list,
                groups.join(",\n    ")
            ));
        }
        Ok(statements)
    }
}

impl StatementGenerator for MssqlGenerator {
    fn name(&self) -> &str {
        "mssql"
    }

    fn build_create_and_populate(&self, table: &TableDefinition, rows: &[Row]) -> Result<String> {
        let mut batch = vec![self.create_table(table)?];

        let inserts = self.insert_rows(table, rows)?;
        if !inserts.is_empty() {
            let qualified = qualify_mssql(&table.identity)?;
            let identity = table.has_identity();
            if identity {
                batch.push(format!("SET IDENTITY_INSERT {} ON;", qualified));
            }
            batch.extend(inserts);
            if identity {
                batch.push(format!("SET IDENTITY_INSERT {} OFF;", qualified));
            }
        }

        Ok(batch.join("\n"))
    }

    fn build_drop(&self, table: &TableIdentity) -> Result<String> {
        let qualified = qualify_mssql(table)?;
        Ok(format!(
            "IF OBJECT_ID(N'{}', 'U') IS NOT NULL DROP TABLE {};",
            qualified.replace('\'', "''"),
            qualified
        ))
    }

    fn build_truncate(&self, table: &TableIdentity) -> Result<String> {
        Ok(format!("TRUNCATE TABLE {};", qualify_mssql(table)?))
    }
}

fn quote_list<S: AsRef<str>>(names: &[S]) -> Result<String> {
    Ok(names
        .iter()
        .map(|n| quote_mssql(n.as_ref()))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// Render a column type with its length, precision or scale.
fn format_mssql_type(col: &ColumnDefinition) -> String {
    let data_type = col.data_type.as_str();
    let max_length = col.max_length.unwrap_or(0);
    let precision = col.precision.unwrap_or(0);
    let scale = col.scale.unwrap_or(0);

    match data_type.to_lowercase().as_str() {
        "decimal" | "numeric" => {
            if precision > 0 {
                format!("{}({}, {})", data_type, precision, scale)
            } else {
                format!("{}(18, 0)", data_type)
            }
        }
        "datetime2" | "time" | "datetimeoffset" if scale > 0 => {
            format!("{}({})", data_type, scale)
        }
        "char" | "varchar" | "nchar" | "nvarchar" | "binary" | "varbinary" => {
            if max_length == -1 {
                format!("{}(max)", data_type)
            } else if max_length > 0 {
                format!("{}({})", data_type, max_length)
            } else {
                format!("{}(255)", data_type)
            }
        }
        _ => data_type.to_string(),
    }
}

/// Render a value as a T-SQL literal.
fn mssql_literal(value: &SqlValue) -> Result<String> {
    let literal = match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
        SqlValue::I16(v) => v.to_string(),
        SqlValue::I32(v) => v.to_string(),
        SqlValue::I64(v) => v.to_string(),
        SqlValue::F32(v) if v.is_finite() => v.to_string(),
        SqlValue::F64(v) if v.is_finite() => v.to_string(),
        SqlValue::F32(_) | SqlValue::F64(_) => {
            return Err(CloneError::backend(
                "SQL Server cannot store NaN or infinite float values",
            ))
        }
        SqlValue::Text(s) => format!("N{}", quote_literal(s)),
        SqlValue::Bytes(b) => format!("0x{}", hex::encode(b)),
        SqlValue::Uuid(u) => quote_literal(&u.to_string()),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::DateTime(dt) => quote_literal(&dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        SqlValue::DateTimeOffset(dt) => {
            quote_literal(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
        }
        SqlValue::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => quote_literal(&t.format("%H:%M:%S%.f").to_string()),
    };
    Ok(literal)
}
