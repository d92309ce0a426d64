use crate::backend::{DatabaseBackend, QueryResult, QueryRow};
use crate::error::{GridError, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row};
use std::str::FromStr;
use tracing::debug;

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Create a new SQLite backend with connection pool
    pub async fn new(url: &str) -> Result<Self> {
        Self::with_max_connections(url, 5).await
    }

    async fn with_max_connections(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Create an in-memory SQLite database.
    ///
    /// Every in-memory connection is its own database, so the pool holds one.
    pub async fn memory() -> Result<Self> {
        Self::with_max_connections("sqlite::memory:", 1).await
    }

    /// Create a file-based SQLite database
    pub async fn file(path: &str) -> Result<Self> {
        Self::new(&format!("sqlite://{}", path)).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(GridError::Connection("connection pool is closed".to_string()));
        }
        Ok(())
    }

    /// Convert SQLite row to QueryRow
    fn convert_row(row: &SqliteRow) -> QueryRow {
        let mut query_row = QueryRow::new();
        for column in row.columns() {
            let label = column.name();
            query_row.insert(label, decode_column(row, label));
        }
        query_row
    }
}

/// Decode one column by trying the storage classes SQLite can return.
fn decode_column(row: &SqliteRow, label: &str) -> Value {
    if let Ok(Some(value)) = row.try_get::<Option<i64>, _>(label) {
        return Value::from(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<f64>, _>(label) {
        return serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>(label) {
        return Value::String(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Vec<u8>>, _>(label) {
        return Value::String(base64_encode(&value));
    }
    // declared types such as DATETIME hold text the checked decoders reject
    if let Ok(Some(value)) = row.try_get_unchecked::<Option<String>, _>(label) {
        return Value::String(value);
    }
    Value::Null
}

#[async_trait]
impl DatabaseBackend for SqliteBackend {
    async fn connect(url: &str) -> Result<Self> {
        Self::new(url).await
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.ensure_open()?;
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str) -> Result<QueryResult> {
        self.ensure_open()?;
        debug!(sql = %sql, "sqlite query");
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(Self::convert_row).collect())
    }

    fn is_connected(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Base64 encode bytes so blobs survive as JSON text
fn base64_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut encoded = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let n = chunk
            .iter()
            .enumerate()
            .fold(0u32, |n, (i, b)| n | (*b as u32) << (16 - 8 * i));

        for i in 0..4 {
            if i <= chunk.len() {
                encoded.push(ALPHABET[((n >> (18 - 6 * i)) & 63) as usize] as char);
            } else {
                encoded.push('=');
            }
        }
    }
    encoded
}
