//! MSSQL source access.
//!
//! Provides catalog introspection, bounded row streaming, source row counts
//! and the keep-alive probe, on top of Tiberius with bb8 connection pooling.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::NaiveDateTime;
use futures::TryStreamExt;
use tiberius::{AuthMethod, Client, Config as TiberiusConfig, EncryptionLevel, Query, QueryItem, Row};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SourceConfig;
use crate::core::identifier::quote_mssql;
use crate::core::schema::{Column, SourceTable, TableSchema};
use crate::core::traits::Liveness;
use crate::core::value::SqlValue;
use crate::error::{Result, StageError};

/// Maximum TDS packet size (32767 bytes, ~32KB).
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection acquisition timeout from pool (30 seconds).
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connection timeout (5 minutes).
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// TCP keepalive interval (30 seconds).
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// A batch of decoded rows from the streaming read.
pub type RowBatch = Vec<Vec<SqlValue>>;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> TiberiusConfig {
        let mut config = TiberiusConfig::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

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

        // Enable TCP keepalives; extraction can hold a connection open for a
        // long time between reads.
        if let Ok(std_tcp) = tcp.into_std() {
            let socket = socket2::Socket::from(std_tcp);

            let keepalive = socket2::TcpKeepalive::new()
                .with_time(TCP_KEEPALIVE_INTERVAL)
                .with_interval(TCP_KEEPALIVE_INTERVAL);

            if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
                warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
            }

            let std_tcp: std::net::TcpStream = socket.into();
            std_tcp.set_nonblocking(true).ok();
            let tcp = TcpStream::from_std(std_tcp).map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: format!("Failed to convert socket: {}", e),
            })?;

            Client::connect(config, tcp.compat_write()).await
        } else {
            warn!("Failed to configure TCP keepalives on MSSQL connection");
            let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
                tiberius::error::Error::Io {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            })?;
            tcp.set_nodelay(true).ok();
            Client::connect(config, tcp.compat_write()).await
        }
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// MSSQL source pool.
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlPool {
    /// Connect with the given pool size.
    pub async fn connect(config: SourceConfig, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| StageError::pool(e, "creating MSSQL connection pool"))?;

        // Test connection
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| StageError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, max_size
        );

        Ok(Self { pool })
    }

    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| StageError::pool(e, "getting MSSQL connection from pool"))
    }

    /// Resolve the ordered column list for a table from the source catalog.
    ///
    /// An empty result means the table does not exist; callers treat that as
    /// a no-op signal, not an error.
    pub async fn table_schema(&self, table: &SourceTable) -> Result<TableSchema> {
        let mut client = self.get_client().await?;

        let query = r#"
            SELECT
                column_name,
                data_type,
                CAST(character_maximum_length AS INT),
                CAST(numeric_precision AS INT),
                CAST(numeric_scale AS INT)
            FROM information_schema.columns
            WHERE table_name = lower(@P1) AND table_schema = lower(@P2)
            ORDER BY ordinal_position
        "#;

        let mut query = Query::new(query);
        query.bind(&table.name);
        query.bind(&table.schema);

        let stream = query.query(&mut client).await?;
        let rows = stream.into_first_result().await?;

        let columns = rows
            .iter()
            .enumerate()
            .map(|(i, row)| Column {
                name: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                data_type: row.get::<&str, _>(1).unwrap_or_default().to_string(),
                char_length: row.get::<i32, _>(2),
                precision: row.get::<i32, _>(3),
                scale: row.get::<i32, _>(4),
                ordinal: i as i32 + 1,
            })
            .collect::<Vec<_>>();

        debug!(
            "Resolved {} columns for {}",
            columns.len(),
            table.qualified()
        );
        Ok(TableSchema::new(columns))
    }

    /// Exact row count, captured before extraction begins.
    pub async fn row_count(&self, table: &SourceTable) -> Result<i64> {
        let mut client = self.get_client().await?;

        let query = format!(
            "SELECT CAST(COUNT(1) AS BIGINT) FROM {}.{} WITH (NOLOCK)",
            quote_mssql(&table.schema)?,
            quote_mssql(&table.name)?
        );

        let stream = client.simple_query(&query).await?;
        let row = stream.into_row().await?;

        Ok(row.and_then(|r| r.get::<i64, _>(0)).unwrap_or(0))
    }

    /// Stream rows for a read query in bounded batches.
    ///
    /// A background task fetches from the wire and sends decoded batches
    /// through a small bounded channel, so the whole result set is never
    /// materialized.
    pub fn stream_rows(
        &self,
        sql: String,
        col_types: Vec<String>,
        batch_size: usize,
    ) -> mpsc::Receiver<Result<RowBatch>> {
        let (tx, rx) = mpsc::channel(4);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            if let Err(e) = stream_rows_internal(pool, sql, col_types, batch_size, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }
}

#[async_trait]
impl Liveness for MssqlPool {
    async fn ping(&self) -> Result<()> {
        let mut client = self.get_client().await?;
        client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }
}

async fn stream_rows_internal(
    pool: Pool<TiberiusConnectionManager>,
    sql: String,
    col_types: Vec<String>,
    batch_size: usize,
    tx: &mpsc::Sender<Result<RowBatch>>,
) -> Result<()> {
    let mut client = pool
        .get()
        .await
        .map_err(|e| StageError::pool(e, "getting connection for row streaming"))?;

    let mut stream = client.simple_query(&sql).await?;
    let mut batch: RowBatch = Vec::with_capacity(batch_size);

    while let Some(item) = stream.try_next().await? {
        let row = match item {
            QueryItem::Row(row) => row,
            QueryItem::Metadata(_) => continue,
        };

        let values = (0..col_types.len())
            .map(|idx| convert_row_value(&row, idx, &col_types[idx]))
            .collect::<Vec<_>>();
        batch.push(values);

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.send(Ok(full)).await.is_err() {
                return Ok(()); // receiver dropped
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.send(Ok(batch)).await;
    }

    Ok(())
}

/// Convert a row value to SqlValue based on the declared column type.
fn convert_row_value(row: &Row, idx: usize, data_type: &str) -> SqlValue {
    let dt = data_type.to_lowercase();

    match dt.as_str() {
        "bit" => row
            .get::<bool, _>(idx)
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        "tinyint" => row
            .get::<u8, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "smallint" => row
            .get::<i16, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "int" => row
            .get::<i32, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "bigint" => row
            .get::<i64, _>(idx)
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        "real" => row
            .get::<f32, _>(idx)
            .map(|v| SqlValue::Float(v as f64))
            .unwrap_or(SqlValue::Null),
        "float" => row
            .get::<f64, _>(idx)
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        "uniqueidentifier" => row
            .get::<Uuid, _>(idx)
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null),
        "datetime" | "datetime2" | "smalldatetime" => row
            .get::<NaiveDateTime, _>(idx)
            .map(SqlValue::Timestamp)
            .unwrap_or(SqlValue::Null),
        "date" => row
            .get::<NaiveDateTime, _>(idx)
            .map(|dt| SqlValue::Date(dt.date()))
            .unwrap_or(SqlValue::Null),
        "time" => row
            .get::<NaiveDateTime, _>(idx)
            .map(|dt| SqlValue::Text(dt.time().format("%H:%M:%S").to_string()))
            .unwrap_or(SqlValue::Null),
        "decimal" | "numeric" | "money" | "smallmoney" => row
            .get::<rust_decimal::Decimal, _>(idx)
            .map(SqlValue::Decimal)
            .or_else(|| row.get::<f64, _>(idx).map(SqlValue::Float))
            .unwrap_or(SqlValue::Null),
        "binary" | "varbinary" | "image" => row
            .get::<&[u8], _>(idx)
            .map(|v| SqlValue::Text(String::from_utf8_lossy(v).into_owned()))
            .unwrap_or(SqlValue::Null),
        _ => row
            .get::<&str, _>(idx)
            .map(|s| SqlValue::Text(s.to_string()))
            .unwrap_or(SqlValue::Null),
    }
}
