//! SQL Server catalog provider.
//!
//! Reads metadata from `INFORMATION_SCHEMA` and `sys.*` and executes
//! generated batches, using Tiberius with a bb8 connection pool.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use super::generator::MssqlGenerator;
use crate::config::ConnectionConfig;
use crate::core::identifier::{qualify_mssql, quote_mssql, same_name};
use crate::core::{
    ColumnDefinition, DependencyDirection, KeyDefinition, MetadataProvider, Row as ValueRow,
    SqlValue, StatementGenerator, TableDefinition, TableIdentity,
};
use crate::error::{CloneError, Result};

/// Maximum TDS packet size (32767 bytes, ~32KB).
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection acquisition timeout from pool (30 seconds).
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connection timeout (5 minutes).
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const FOREIGN_KEY_QUERY: &str = r#"
    SELECT
        fk.name,
        ps.name, pt.name, pc.name,
        rs.name, rt.name, rc.name
    FROM sys.foreign_keys fk
    JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
    JOIN sys.tables pt ON pt.object_id = fk.parent_object_id
    JOIN sys.schemas ps ON ps.schema_id = pt.schema_id
    JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
    JOIN sys.tables rt ON rt.object_id = fk.referenced_object_id
    JOIN sys.schemas rs ON rs.schema_id = rt.schema_id
    JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
"#;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: ConnectionConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.effective_port());
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;
        tcp.set_nodelay(true).ok();
        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// [`MetadataProvider`] for SQL Server.
pub struct MssqlProvider {
    pool: Pool<TiberiusConnectionManager>,
    connection_id: String,
    default_schema: String,
}

impl MssqlProvider {
    /// Open a pool and verify the connection.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| CloneError::pool(e, "creating MSSQL connection pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| CloneError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host,
            config.effective_port(),
            config.database,
            config.max_connections
        );

        Ok(Self {
            pool,
            connection_id: config.connection_id(),
            default_schema: config.effective_default_schema(),
        })
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| CloneError::pool(e, "getting MSSQL connection from pool"))
    }

    async fn load_columns(
        &self,
        conn: &mut Client<Compat<TcpStream>>,
        table: &mut TableDefinition,
    ) -> Result<()> {
        let query = r#"
            SELECT
                COLUMN_NAME,
                DATA_TYPE,
                CAST(CHARACTER_MAXIMUM_LENGTH AS INT),
                CAST(NUMERIC_PRECISION AS INT),
                CAST(NUMERIC_SCALE AS INT),
                CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END,
                ISNULL(COLUMNPROPERTY(OBJECT_ID(QUOTENAME(TABLE_SCHEMA) + '.' + QUOTENAME(TABLE_NAME)), COLUMN_NAME, 'IsIdentity'), 0),
                ORDINAL_POSITION,
                COLUMN_DEFAULT
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION
        "#;

        let mut query = Query::new(query);
        query.bind(table.identity.schema.as_str());
        query.bind(table.identity.name.as_str());

        let rows = query.query(conn).await?.into_first_result().await?;
        for row in rows {
            table.columns.push(ColumnDefinition {
                name: row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
                data_type: row.try_get::<&str, _>(1)?.unwrap_or_default().to_string(),
                max_length: row.try_get::<i32, _>(2)?,
                precision: row.try_get::<i32, _>(3)?,
                scale: row.try_get::<i32, _>(4)?,
                is_nullable: row.try_get::<i32, _>(5)?.unwrap_or(0) == 1,
                is_identity: row.try_get::<i32, _>(6)?.unwrap_or(0) == 1,
                ordinal_position: row.try_get::<i32, _>(7)?.unwrap_or(0),
                default_value: row.try_get::<&str, _>(8)?.map(str::to_string),
            });
        }

        debug!("Loaded {} columns for {}", table.columns.len(), table.identity);
        Ok(())
    }

    async fn load_primary_key(
        &self,
        conn: &mut Client<Compat<TcpStream>>,
        table: &mut TableDefinition,
    ) -> Result<()> {
        let query = r#"
            SELECT tc.CONSTRAINT_NAME, c.COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE c
                ON c.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
                AND c.TABLE_SCHEMA = tc.TABLE_SCHEMA
                AND c.TABLE_NAME = tc.TABLE_NAME
            WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
              AND tc.TABLE_SCHEMA = @P1
              AND tc.TABLE_NAME = @P2
            ORDER BY c.ORDINAL_POSITION
        "#;

        let mut query = Query::new(query);
        query.bind(table.identity.schema.as_str());
        query.bind(table.identity.name.as_str());

        let rows = query.query(conn).await?.into_first_result().await?;
        for row in rows {
            table.keys.push(KeyDefinition::Primary {
                schema: table.identity.schema.clone(),
                table: table.identity.name.clone(),
                constraint: row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
                column: row.try_get::<&str, _>(1)?.unwrap_or_default().to_string(),
            });
        }
        Ok(())
    }

    /// Foreign key columns matching a filter on owner (`ps`/`pt`) or referenced (`rs`/`rt`) side.
    async fn query_foreign_keys(
        &self,
        conn: &mut Client<Compat<TcpStream>>,
        table: &TableIdentity,
        referencing: bool,
    ) -> Result<Vec<KeyDefinition>> {
        let filter = if referencing {
            "WHERE rs.name = @P1 AND rt.name = @P2"
        } else {
            "WHERE ps.name = @P1 AND pt.name = @P2"
        };
        let sql = format!(
            "{} {} ORDER BY fk.name, fkc.constraint_column_id",
            FOREIGN_KEY_QUERY, filter
        );

        let mut query = Query::new(sql);
        query.bind(table.schema.as_str());
        query.bind(table.name.as_str());

        let rows = query.query(conn).await?.into_first_result().await?;
        rows.iter().map(foreign_key_from_row).collect()
    }
}

fn text(row: &Row, idx: usize) -> Result<String> {
    Ok(row.try_get::<&str, _>(idx)?.unwrap_or_default().to_string())
}

fn foreign_key_from_row(row: &Row) -> Result<KeyDefinition> {
    Ok(KeyDefinition::Foreign {
        constraint: text(row, 0)?,
        schema: text(row, 1)?,
        table: text(row, 2)?,
        column: text(row, 3)?,
        referenced_schema: text(row, 4)?,
        referenced_table: text(row, 5)?,
        referenced_column: text(row, 6)?,
    })
}

#[async_trait]
impl MetadataProvider for MssqlProvider {
    async fn list_schemas(&self) -> Result<Vec<String>> {
        let mut conn = self.get_conn().await?;
        let rows = conn
            .simple_query("SELECT name FROM sys.schemas ORDER BY name")
            .await?
            .into_first_result()
            .await?;
        rows.iter().map(|r| text(r, 0)).collect()
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableIdentity>> {
        let mut conn = self.get_conn().await?;
        let query = r#"
            SELECT TABLE_SCHEMA, TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = @P1
            ORDER BY TABLE_NAME
        "#;
        let mut q = Query::new(query);
        q.bind(schema);
        let rows = q.query(&mut *conn).await?.into_first_result().await?;

        let tables = rows
            .iter()
            .map(|r| Ok(TableIdentity::new(text(r, 0)?, text(r, 1)?)))
            .collect::<Result<Vec<_>>>()?;
        debug!("Found {} tables in schema '{}'", tables.len(), schema);
        Ok(tables)
    }

    async fn describe_table(&self, table: &TableIdentity) -> Result<Option<TableDefinition>> {
        let mut conn = self.get_conn().await?;
        let mut definition = TableDefinition::new(table.clone());

        self.load_columns(&mut conn, &mut definition).await?;
        if definition.columns.is_empty() {
            return Ok(None);
        }
        self.load_primary_key(&mut conn, &mut definition).await?;
        let foreign_keys = self.query_foreign_keys(&mut conn, table, false).await?;
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
        let mut conn = self.get_conn().await?;

        let mut keys = Vec::new();
        if direction.includes_ascending() {
            keys.extend(self.query_foreign_keys(&mut conn, table, false).await?);
        }
        if direction.includes_descending() {
            for key in self.query_foreign_keys(&mut conn, table, true).await? {
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
        let mut conn = self.get_conn().await?;
        let query = "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2";
        let result = conn.query(query, &[&table.schema.as_str(), &table.name.as_str()]).await?;
        match result.into_row().await? {
            Some(row) => Ok(row.try_get::<i32, _>(0)?.unwrap_or(0) > 0),
            None => Ok(false),
        }
    }

    async fn create_schema(&self, schema: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let query = format!(
            "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = @P1) EXEC(N'CREATE SCHEMA {}')",
            quote_mssql(schema)?.replace('\'', "''")
        );
        conn.execute(query, &[&schema]).await?;
        debug!("Created schema: {}", schema);
        Ok(())
    }

    async fn drop_table(&self, table: &TableIdentity) -> Result<()> {
        let mut conn = self.get_conn().await?;

        let mut referenced_by: Vec<String> = Vec::new();
        for key in self.query_foreign_keys(&mut conn, table, true).await? {
            let owner = key.owner();
            if owner != *table && !referenced_by.contains(&owner.to_string()) {
                referenced_by.push(owner.to_string());
            }
        }
        if !referenced_by.is_empty() {
            return Err(CloneError::ReferentialConflict {
                table: table.to_string(),
                referenced_by,
            });
        }

        let query = MssqlGenerator::new().build_drop(table)?;
        conn.execute(query, &[]).await?;
        debug!("Dropped table: {}", table);
        Ok(())
    }

    async fn execute_statement(&self, sql: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let result = conn.execute(sql, &[]).await?;
        debug!("Executed batch ({} rows affected)", result.total());
        Ok(())
    }

    async fn read_rows(&self, table: &TableDefinition) -> Result<Vec<ValueRow>> {
        let columns = table.ordered_columns();
        let sql = select_rows_sql(table)?;

        let mut conn = self.get_conn().await?;
        let rows = conn.simple_query(sql).await?.into_first_result().await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = columns
                .iter()
                .enumerate()
                .map(|(idx, col)| convert_row_value(row, idx, &col.data_type))
                .collect::<Result<Vec<_>>>()?;
            result.push(values);
        }

        debug!("Read {} rows from {}", result.len(), table.identity);
        Ok(result)
    }

    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn db_type(&self) -> &str {
        "mssql"
    }

    fn default_schema(&self) -> &str {
        &self.default_schema
    }

    async fn close(&self) {
        // bb8 handles cleanup
    }
}

/// Read one column as a typed value, keyed on the catalog data type.
/// Plain read-committed SELECT of every column in ordinal order.
fn select_rows_sql(table: &TableDefinition) -> Result<String> {
    let select_list = table
        .ordered_columns()
        .iter()
        .map(|c| quote_mssql(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    Ok(format!(
        "SELECT {} FROM {}",
        select_list,
        qualify_mssql(&table.identity)?
    ))
}

fn convert_row_value(row: &Row, idx: usize, data_type: &str) -> Result<SqlValue> {
    let value = match data_type.to_lowercase().as_str() {
        "bit" => row.try_get::<bool, _>(idx)?.into(),
        "tinyint" => row.try_get::<u8, _>(idx)?.map(i16::from).into(),
        "smallint" => row.try_get::<i16, _>(idx)?.into(),
        "int" => row.try_get::<i32, _>(idx)?.into(),
        "bigint" => row.try_get::<i64, _>(idx)?.into(),
        "real" => row
            .try_get::<f32, _>(idx)?
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null),
        "float" => row.try_get::<f64, _>(idx)?.into(),
        "uniqueidentifier" => row.try_get::<uuid::Uuid, _>(idx)?.into(),
        "datetime" | "datetime2" | "smalldatetime" => {
            row.try_get::<chrono::NaiveDateTime, _>(idx)?.into()
        }
        "datetimeoffset" => row
            .try_get::<chrono::DateTime<chrono::FixedOffset>, _>(idx)?
            .into(),
        "date" => row.try_get::<chrono::NaiveDate, _>(idx)?.into(),
        "time" => row.try_get::<chrono::NaiveTime, _>(idx)?.into(),
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => {
            row.try_get::<&[u8], _>(idx)?.map(<[u8]>::to_vec).into()
        }
        "money" | "smallmoney" => row.try_get::<f64, _>(idx)?.into(),
        "decimal" | "numeric" => row.try_get::<rust_decimal::Decimal, _>(idx)?.into(),
        _ => row.try_get::<&str, _>(idx)?.into(),
    };
    Ok(value)
}
