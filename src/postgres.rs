use crate::backend::{DatabaseBackend, QueryResult, QueryRow};
use crate::error::{GridError, Result};
use crate::render::DATETIME_FORMAT;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row};
use tracing::debug;

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Create a new PostgreSQL backend with connection pool
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(GridError::Connection("connection pool is closed".to_string()));
        }
        Ok(())
    }

    /// Convert PostgreSQL row to QueryRow
    fn convert_row(row: &PgRow) -> QueryRow {
        let mut query_row = QueryRow::new();
        for column in row.columns() {
            let label = column.name();
            query_row.insert(label, decode_column(row, label));
        }
        query_row
    }
}

/// Decode one column.
///
/// Results come back in binary format, so temporal and NUMERIC columns are read
/// through their own types. Temporal values are rendered as text the way the
/// grid displays them.
fn decode_column(row: &PgRow, label: &str) -> Value {
    if let Ok(Some(value)) = row.try_get::<Option<Value>, _>(label) {
        return value;
    }
    if let Ok(Some(value)) = row.try_get::<Option<i64>, _>(label) {
        return Value::from(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i32>, _>(label) {
        return Value::from(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i16>, _>(label) {
        return Value::from(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<f64>, _>(label) {
        return float_value(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<f32>, _>(label) {
        return float_value(f64::from(value));
    }
    if let Ok(Some(value)) = row.try_get::<Option<Decimal>, _>(label) {
        return decimal_value(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<bool>, _>(label) {
        return Value::Bool(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<NaiveDateTime>, _>(label) {
        return Value::String(value.format(DATETIME_FORMAT).to_string());
    }
    if let Ok(Some(value)) = row.try_get::<Option<DateTime<Utc>>, _>(label) {
        return Value::String(value.format(DATETIME_FORMAT).to_string());
    }
    if let Ok(Some(value)) = row.try_get::<Option<NaiveDate>, _>(label) {
        return Value::String(value.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(value)) = row.try_get::<Option<NaiveTime>, _>(label) {
        return Value::String(value.format("%H:%M:%S").to_string());
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>(label) {
        return Value::String(value);
    }
    if let Ok(Some(value)) = row.try_get_unchecked::<Option<String>, _>(label) {
        return Value::String(value);
    }
    Value::Null
}

fn float_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// NUMERIC as a JSON integer when it has no fraction, a float otherwise.
fn decimal_value(value: Decimal) -> Value {
    let text = value.normalize().to_string();
    if let Ok(int) = text.parse::<i64>() {
        return Value::from(int);
    }
    match text.parse::<f64>() {
        Ok(float) if float.is_finite() => float_value(float),
        _ => Value::String(text),
    }
}

#[async_trait]
impl DatabaseBackend for PostgresBackend {
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
        debug!(sql = %sql, "postgres query");
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
