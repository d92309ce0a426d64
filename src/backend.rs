use crate::error::Result;
use crate::row::RowData;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Row from a query result, keyed by result label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRow {
    pub columns: BTreeMap<String, Value>,
}

impl QueryRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.columns.insert(key.into(), value);
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.columns.get(key)
    }

    /// Integer value; numeric text (some drivers return `COUNT` as text) is parsed.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.columns.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Nest the flat labels (`o.customer.name`) into a grid row.
    ///
    /// Plain labels go in before dotted ones, so a scalar sharing its name with
    /// a relation always claims the slot first.
    pub fn to_row_data(&self) -> RowData {
        let (plain, dotted): (Vec<_>, Vec<_>) = self.columns.iter().partition(|(k, _)| !k.contains('.'));
        RowData::from_labels(
            plain
                .into_iter()
                .chain(dotted)
                .map(|(k, v)| (k.as_str(), v.clone())),
        )
    }
}

/// Result of a query
pub type QueryResult = Vec<QueryRow>;

/// Database backend the relational grid adapter reads from
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Connect to the database
    async fn connect(url: &str) -> Result<Self>
    where
        Self: Sized;

    /// Execute a SQL statement (no results)
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Query and return results
    async fn query(&mut self, sql: &str) -> Result<QueryResult>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(self) -> Result<()>;
}
