//! PostgreSQL catalog provider.
//!
//! Metadata comes from `information_schema` and `pg_catalog`. Rows are read
//! with every column cast to text, which the server can cast back on insert.

use async_trait::async_trait;
use deadpool_postgres::{Client, Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::error::SqlState;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info};

use super::generator::PgGenerator;
use super::tls::SslMode;
use crate::config::ConnectionConfig;
use crate::core::identifier::{qualify_pg, quote_pg, same_name};
use crate::core::{
    ColumnDefinition, DependencyDirection, KeyDefinition, MetadataProvider, Row, SqlValue,
    StatementGenerator, TableDefinition, TableIdentity,
};
use crate::error::{CloneError, Result};

const FOREIGN_KEY_QUERY: &str = r#"
    SELECT
        c.conname::text,
        n.nspname::text, t.relname::text, a.attname::text,
        rn.nspname::text, rt.relname::text, ra.attname::text
    FROM pg_catalog.pg_constraint c
    JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
    JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
    CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(attnum, refnum, pos)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = k.refnum
    WHERE c.contype = 'f'
"#;

/// [`MetadataProvider`] for PostgreSQL.
pub struct PgProvider {
    pool: Pool,
    connection_id: String,
    default_schema: String,
}

impl PgProvider {
    /// Open a pool and verify the connection.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.effective_port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let max_size = config.max_connections as usize;
        let pool = match SslMode::parse(&config.ssl_mode)?.connector()? {
            None => {
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr).max_size(max_size).build()
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr).max_size(max_size).build()
            }
        }
        .map_err(|e| CloneError::pool(e, "creating PostgreSQL pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| CloneError::pool(e, "testing PostgreSQL connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            pool,
            connection_id: config.connection_id(),
            default_schema: config.effective_default_schema(),
        })
    }

    async fn get_client(&self, context: &str) -> Result<Client> {
        self.pool
            .get()
            .await
            .map_err(|e| CloneError::pool(e, format!("getting connection for {}", context)))
    }

    async fn query_foreign_keys(
        &self,
        client: &Client,
        table: &TableIdentity,
        referencing: bool,
    ) -> Result<Vec<KeyDefinition>> {
        let filter = if referencing {
            "AND rn.nspname = $1 AND rt.relname = $2"
        } else {
            "AND n.nspname = $1 AND t.relname = $2"
        };
        let sql = format!("{} {} ORDER BY c.conname, k.pos", FOREIGN_KEY_QUERY, filter);

        let rows = client.query(sql.as_str(), &[&table.schema, &table.name]).await?;
        rows.iter()
            .map(|row| {
                Ok(KeyDefinition::Foreign {
                    constraint: row.try_get(0)?,
                    schema: row.try_get(1)?,
                    table: row.try_get(2)?,
                    column: row.try_get(3)?,
                    referenced_schema: row.try_get(4)?,
                    referenced_table: row.try_get(5)?,
                    referenced_column: row.try_get(6)?,
                })
            })
            .collect()
    }

    async fn load_columns(&self, client: &Client, table: &mut TableDefinition) -> Result<()> {
        let query = r#"
            SELECT
                column_name::text,
                data_type::text,
                character_maximum_length::int4,
                numeric_precision::int4,
                numeric_scale::int4,
                is_nullable = 'YES',
                is_identity = 'YES',
                ordinal_position::int4,
                column_default::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = client
            .query(query, &[&table.identity.schema, &table.identity.name])
            .await?;

        for row in rows {
            table.columns.push(ColumnDefinition {
                name: row.try_get(0)?,
                data_type: row.try_get(1)?,
                max_length: row.try_get(2)?,
                precision: row.try_get(3)?,
                scale: row.try_get(4)?,
                is_nullable: row.try_get(5)?,
                is_identity: row.try_get(6)?,
                ordinal_position: row.try_get(7)?,
                default_value: row.try_get(8)?,
            });
        }

        debug!("Loaded {} columns for {}", table.columns.len(), table.identity);
        Ok(())
    }

    async fn load_primary_key(&self, client: &Client, table: &mut TableDefinition) -> Result<()> {
        let query = r#"
            SELECT c.conname::text, a.attname::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            CROSS JOIN LATERAL unnest(c.conkey) WITH ORDINALITY AS k(attnum, pos)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            WHERE c.contype = 'p' AND n.nspname = $1 AND t.relname = $2
            ORDER BY k.pos
        "#;

        let rows = client
            .query(query, &[&table.identity.schema, &table.identity.name])
            .await?;

        for row in rows {
            table.keys.push(KeyDefinition::Primary {
                schema: table.identity.schema.clone(),
                table: table.identity.name.clone(),
                constraint: row.try_get(0)?,
                column: row.try_get(1)?,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataProvider for PgProvider {
    async fn list_schemas(&self) -> Result<Vec<String>> {
        let client = self.get_client("list_schemas").await?;
        let rows = client
            .query(
                "SELECT nspname::text FROM pg_catalog.pg_namespace ORDER BY nspname",
                &[],
            )
            .await?;
        rows.iter().map(|r| Ok(r.try_get(0)?)).collect()
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableIdentity>> {
        let client = self.get_client("list_tables").await?;
        let rows = client
            .query(
                r#"
                SELECT table_schema::text, table_name::text
                FROM information_schema.tables
                WHERE table_type = 'BASE TABLE' AND table_schema = $1
                ORDER BY table_name
                "#,
                &[&schema],
            )
            .await?;

        let tables = rows
            .iter()
            .map(|r| Ok(TableIdentity::new(r.try_get::<_, String>(0)?, r.try_get::<_, String>(1)?)))
            .collect::<Result<Vec<_>>>()?;
        debug!("Found {} tables in schema '{}'", tables.len(), schema);
        Ok(tables)
    }

    async fn describe_table(&self, table: &TableIdentity) -> Result<Option<TableDefinition>> {
        let client = self.get_client("describe_table").await?;
        let mut definition = TableDefinition::new(table.clone());

        self.load_columns(&client, &mut definition).await?;
        if definition.columns.is_empty() {
            return Ok(None);
        }
        self.load_primary_key(&client, &mut definition).await?;
        let foreign_keys = self.query_foreign_keys(&client, table, false).await?;
        definition.keys.extend(foreign_keys);

        Ok(Some(definition))
    }

    async fn list_foreign_keys(
        &self,
        table: &TableIdentity,
        direction: DependencyDirection,
        scope: Option<&str>,
    ) -> Result<Vec<KeyDefinition>> {
        let direction = direction.validate()?;
        let client = self.get_client("list_foreign_keys").await?;

        let mut keys = Vec::new();
        if direction.includes_ascending() {
            keys.extend(self.query_foreign_keys(&client, table, false).await?);
        }
        if direction.includes_descending() {
            for key in self.query_foreign_keys(&client, table, true).await? {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }

        if let Some(scope) = scope {
            keys.retain(|k| k.other_side(table).is_some_and(|t| same_name(&t.schema, scope)));
        }
        Ok(keys)
    }

    async fn table_exists(&self, table: &TableIdentity) -> Result<bool> {
        let client = self.get_client("table_exists").await?;
        let row = client
            .query_one(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_type = 'BASE TABLE' AND table_schema = $1 AND table_name = $2
                )
                "#,
                &[&table.schema, &table.name],
            )
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn create_schema(&self, schema: &str) -> Result<()> {
        let client = self.get_client("create_schema").await?;
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_pg(schema)?);
        client.batch_execute(&sql).await?;
        debug!("Created schema: {}", schema);
        Ok(())
    }

    async fn drop_table(&self, table: &TableIdentity) -> Result<()> {
        let client = self.get_client("drop_table").await?;
        let sql = PgGenerator::new().build_drop(table)?;

        match client.batch_execute(&sql).await {
            Ok(()) => {
                debug!("Dropped table: {}", table);
                Ok(())
            }
            Err(e) if e.code() == Some(&SqlState::DEPENDENT_OBJECTS_STILL_EXIST) => {
                let referenced_by = self
                    .query_foreign_keys(&client, table, true)
                    .await?
                    .iter()
                    .map(KeyDefinition::owner)
                    .filter(|owner| owner != table)
                    .map(|owner| owner.to_string())
                    .fold(Vec::new(), |mut acc, name| {
                        if !acc.contains(&name) {
                            acc.push(name);
                        }
                        acc
                    });
                Err(CloneError::ReferentialConflict {
                    table: table.to_string(),
                    referenced_by,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn execute_statement(&self, sql: &str) -> Result<()> {
        let client = self.get_client("execute_statement").await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn read_rows(&self, table: &TableDefinition) -> Result<Vec<Row>> {
        let columns = table.ordered_columns();
        let select_list = columns
            .iter()
            .map(|c| quote_pg(&c.name).map(|q| format!("{}::text", q)))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!("SELECT {} FROM {}", select_list, qualify_pg(&table.identity)?);

        let client = self.get_client("read_rows").await?;
        let rows = client.query(sql.as_str(), &[]).await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(SqlValue::from(row.try_get::<_, Option<String>>(idx)?));
            }
            result.push(values);
        }

        debug!("Read {} rows from {}", result.len(), table.identity);
        Ok(result)
    }

    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    fn default_schema(&self) -> &str {
        &self.default_schema
    }

    async fn close(&self) {
        self.pool.close();
    }
}
