//! Relational grid adapter over a [`SelectBuilder`] and a [`DatabaseBackend`].

use crate::adapter::{failed_stream, intercept, ExportItem, ExportStream, FetchInterceptor, GridAdapter};
use crate::backend::{DatabaseBackend, QueryRow};
use crate::builder::{ComparisonOp, Condition, SelectBuilder};
use crate::error::{GridError, Result};
use crate::grid::Grid;
use crate::render::{render_row, render_rows};
use crate::result::ResultSet;
use crate::row::{AliasMap, RowData};
use crate::translate::translate;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

const ADAPTER_NAME: &str = "select";

pub struct SelectAdapter<B: DatabaseBackend> {
    backend: B,
    grid: Option<Grid>,
    query: Option<SelectBuilder>,
    prepared: Option<SelectBuilder>,
    aliases: AliasMap,
    result: ResultSet,
}

impl<B: DatabaseBackend> SelectAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            grid: None,
            query: None,
            prepared: None,
            aliases: AliasMap::default(),
            result: ResultSet::default(),
        }
    }

    pub fn with_grid(mut self, grid: Grid) -> Self {
        self.set_grid(grid);
        self
    }

    pub fn with_query(mut self, query: SelectBuilder) -> Self {
        self.set_query(query);
        self
    }

    /// Attach a grid; the next fetch translates again.
    pub fn set_grid(&mut self, grid: Grid) {
        self.grid = Some(grid);
        self.prepared = None;
    }

    /// Attach the base query; the next fetch translates again.
    pub fn set_query(&mut self, query: SelectBuilder) {
        self.query = Some(query);
        self.prepared = None;
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    /// Translated query once prepared, the base query before.
    pub fn query(&self) -> Option<&SelectBuilder> {
        self.prepared.as_ref().or(self.query.as_ref())
    }

    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

#[async_trait]
impl<B: DatabaseBackend> GridAdapter for SelectAdapter<B> {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    fn prepare(&mut self) -> Result<()> {
        if self.prepared.is_some() {
            debug!(adapter = ADAPTER_NAME, "Query already prepared");
            return Ok(());
        }

        let grid = self
            .grid
            .as_ref()
            .ok_or_else(|| GridError::Configuration("no grid attached to the adapter".to_string()))?;
        let base = self
            .query
            .as_ref()
            .ok_or_else(|| GridError::Configuration("no query attached to the adapter".to_string()))?;

        let mut query = translate(base, grid)?;
        let aliases = AliasMap::from_query(&query);
        project_columns(&mut query, grid, &aliases);

        self.aliases = aliases;
        self.prepared = Some(query);
        Ok(())
    }

    async fn fetch_data(&mut self, interceptor: Option<&dyn FetchInterceptor>) -> Result<()> {
        self.prepare()?;

        let (Some(grid), Some(query)) = (self.grid.as_ref(), self.prepared.as_ref()) else {
            return Err(GridError::Configuration("adapter is not prepared".to_string()));
        };

        let sql = query.build()?;
        debug!(adapter = ADAPTER_NAME, sql = %sql, "Fetching grid page");
        let rows: Vec<RowData> = self
            .backend
            .query(&sql)
            .await?
            .iter()
            .map(QueryRow::to_row_data)
            .collect();

        let count_sql = query.count_query()?;
        debug!(adapter = ADAPTER_NAME, sql = %count_sql, "Counting grid rows");
        let total = self
            .backend
            .query(&count_sql)
            .await?
            .first()
            .and_then(|row| row.get_i64("total"))
            .ok_or_else(|| GridError::Query("count query returned no total".to_string()))?
            .max(0) as usize;

        let mut result = ResultSet::new(render_rows(grid, &rows, Some(&self.aliases)), total);

        if grid.config().user_data_on_footer && total > 0 {
            result.set_summary(fetch_summary(&mut self.backend, grid, query).await?);
        }

        let result = intercept(interceptor, ADAPTER_NAME, grid, result);
        info!(
            adapter = ADAPTER_NAME,
            grid = grid.name(),
            rows = result.count_items(),
            total = result.count_items_total(),
            "Fetched grid data"
        );
        self.result = result;
        Ok(())
    }

    fn result_set(&self) -> &ResultSet {
        &self.result
    }

    fn export(&mut self, keys: Vec<Value>) -> ExportStream<'_> {
        if let Err(error) = self.prepare() {
            return failed_stream(error);
        }

        let (Some(grid), Some(query)) = (self.grid.as_ref(), self.prepared.as_ref()) else {
            return failed_stream(GridError::Configuration("adapter is not prepared".to_string()));
        };
        let Some(row_id_column) = grid.config().row_id_column.as_deref() else {
            return failed_stream(GridError::Configuration(
                "export requires a row id column".to_string(),
            ));
        };

        // selected keys are refetched without the grid filter
        let row_query = match (keys.is_empty(), self.query.as_ref()) {
            (false, Some(base)) => {
                let mut base = base.clone();
                project_columns(&mut base, grid, &self.aliases);
                base
            }
            _ => query.clone(),
        };

        let state = ExportState {
            backend: &mut self.backend,
            grid,
            query,
            row_query,
            aliases: &self.aliases,
            key_column: query.qualify(row_id_column),
            keys: keys.into(),
            phase: ExportPhase::Keys,
            position: 0,
        };

        Box::pin(futures::stream::unfold(state, |mut state| async move {
            let item = state.next_item().await?;
            Some((item, state))
        }))
    }
}

/// Select every identifier the grid columns read, labelled by relation path.
fn project_columns(query: &mut SelectBuilder, grid: &Grid, aliases: &AliasMap) {
    for column in grid.columns() {
        for identifier in column.source_identifiers() {
            query.project(identifier, &aliases.normalize(identifier));
        }
    }
}

/// One aggregate query per non-hidden column with a summary type.
async fn fetch_summary<B: DatabaseBackend>(
    backend: &mut B,
    grid: &Grid,
    query: &SelectBuilder,
) -> Result<Map<String, Value>> {
    let mut summary = Map::new();

    for column in grid.columns() {
        let attributes = column.attributes();
        let Some(summary_type) = attributes.summary_type else {
            continue;
        };
        if attributes.is_hidden {
            continue;
        }

        let sql = query.summary_query(summary_type.aggregate_func(), &column.search_operand().to_sql())?;
        debug!(adapter = ADAPTER_NAME, column = column.name(), sql = %sql, "Fetching summary");

        let value = backend
            .query(&sql)
            .await?
            .first()
            .and_then(|row| row.value("summary_value").cloned())
            .unwrap_or(Value::Null);
        if !value.is_null() {
            summary.insert(column.name().to_string(), value);
        }
    }

    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportPhase {
    Keys,
    Rows,
    Done,
}

struct ExportState<'a, B: DatabaseBackend> {
    backend: &'a mut B,
    grid: &'a Grid,
    query: &'a SelectBuilder,
    row_query: SelectBuilder,
    aliases: &'a AliasMap,
    key_column: String,
    keys: VecDeque<Value>,
    phase: ExportPhase,
    position: usize,
}

impl<'a, B: DatabaseBackend> ExportState<'a, B> {
    async fn next_item(&mut self) -> Option<ExportItem> {
        match self.phase {
            ExportPhase::Done => None,
            ExportPhase::Keys => {
                if self.keys.is_empty() {
                    match self.load_keys().await {
                        Ok(keys) => self.keys = keys,
                        Err(error) => return Some(self.fail(error)),
                    }
                }
                self.phase = ExportPhase::Rows;
                Some(ExportItem::Total(self.keys.len()))
            }
            ExportPhase::Rows => loop {
                let Some(key) = self.keys.pop_front() else {
                    self.phase = ExportPhase::Done;
                    return None;
                };

                match self.load_row(&key).await {
                    Ok(Some(row)) => {
                        let rendered = render_row(self.grid, &row, self.position, Some(self.aliases));
                        self.position += 1;
                        return Some(ExportItem::Row(rendered));
                    }
                    Ok(None) => {
                        debug!(adapter = ADAPTER_NAME, key = %key, "Export row no longer exists, skipping");
                    }
                    Err(error) => return Some(self.fail(error)),
                }
            },
        }
    }

    fn fail(&mut self, error: GridError) -> ExportItem {
        warn!(adapter = ADAPTER_NAME, error = %error, "Export failed");
        self.phase = ExportPhase::Done;
        ExportItem::Failed(error)
    }

    async fn load_keys(&mut self) -> Result<VecDeque<Value>> {
        let sql = self.query.key_query(&self.key_column)?;
        debug!(adapter = ADAPTER_NAME, sql = %sql, "Loading export keys");

        Ok(self
            .backend
            .query(&sql)
            .await?
            .iter()
            .filter_map(|row| row.value("row_key").cloned())
            .filter(|key| !key.is_null())
            .collect())
    }

    async fn load_row(&mut self, key: &Value) -> Result<Option<RowData>> {
        let sql = self
            .row_query
            .unpaged()
            .and_where(Condition::simple(self.key_column.as_str(), ComparisonOp::Eq, key.clone()))
            .limit(1)
            .build()?;

        Ok(self.backend.query(&sql).await?.first().map(QueryRow::to_row_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueryResult;
    use crate::builder::LogicalOp;
    use crate::column::{Column, SummaryType};
    use crate::config::GridConfig;
    use crate::filter::{Filter, FilterOperator, FilterRule};
    use crate::grid::GridParams;
    use futures::StreamExt;
    use serde_json::json;

    /// Records every query and answers with canned results in order.
    struct MockBackend {
        executed: Vec<String>,
        responses: VecDeque<QueryResult>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                executed: Vec::new(),
                responses: VecDeque::new(),
            }
        }

        fn respond(mut self, rows: Vec<Vec<(&str, Value)>>) -> Self {
            let result = rows
                .into_iter()
                .map(|pairs| {
                    let mut row = QueryRow::new();
                    for (label, value) in pairs {
                        row.insert(label, value);
                    }
                    row
                })
                .collect();
            self.responses.push_back(result);
            self
        }
    }

    #[async_trait]
    impl DatabaseBackend for MockBackend {
        async fn connect(_url: &str) -> Result<Self> {
            Ok(Self::new())
        }

        async fn execute(&mut self, sql: &str) -> Result<u64> {
            self.executed.push(sql.to_string());
            Ok(0)
        }

        async fn query(&mut self, sql: &str) -> Result<QueryResult> {
            self.executed.push(sql.to_string());
            Ok(self.responses.pop_front().unwrap_or_default())
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn close(self) -> Result<()> {
            Ok(())
        }
    }

    fn orders_grid(filter: Filter) -> Grid {
        Grid::new("orders")
            .column(Column::text("id", "o.id"))
            .column(Column::text("customer", "c.name"))
            .column(Column::text("total", "o.total").summary(SummaryType::Sum))
            .with_params(GridParams {
                page: 2,
                page_size: Some(10),
                filter,
                ..GridParams::default()
            })
    }

    fn orders_query() -> SelectBuilder {
        SelectBuilder::new("orders")
            .alias("o")
            .select(vec!["o.*"])
            .left_join_relation("customers", "c", "o.customer", Condition::Raw("c.id = o.customer_id".into()))
    }

    #[test]
    fn test_prepare_translates_and_projects() {
        let grid = orders_grid(Filter::new(LogicalOp::And).rule("customer", FilterOperator::BeginsWith, "Jo"));
        let mut adapter = SelectAdapter::new(MockBackend::new())
            .with_grid(grid)
            .with_query(orders_query());

        adapter.prepare().unwrap();
        let sql = adapter.query().unwrap().build().unwrap();

        assert_eq!(
            sql,
            "SELECT o.*, o.id AS \"o.id\", c.name AS \"o.customer.name\", o.total AS \"o.total\" \
             FROM orders o LEFT JOIN customers c ON c.id = o.customer_id \
             WHERE c.name LIKE 'Jo%' ESCAPE '\\' LIMIT 10 OFFSET 10"
        );
        assert_eq!(adapter.aliases().normalize("c.name"), "o.customer.name");
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let grid = orders_grid(Filter::new(LogicalOp::And).rule("id", FilterOperator::Equal, "1"));
        let mut adapter = SelectAdapter::new(MockBackend::new())
            .with_grid(grid)
            .with_query(orders_query());

        adapter.prepare().unwrap();
        let first = adapter.query().unwrap().build().unwrap();
        adapter.prepare().unwrap();
        let second = adapter.query().unwrap().build().unwrap();

        assert!(adapter.is_prepared());
        assert_eq!(first, second);
    }

    #[test]
    fn test_prepare_requires_grid_and_query() {
        let mut adapter = SelectAdapter::new(MockBackend::new()).with_query(orders_query());
        assert!(matches!(adapter.prepare(), Err(GridError::Configuration(_))));

        let mut adapter = SelectAdapter::new(MockBackend::new()).with_grid(orders_grid(Filter::default()));
        assert!(matches!(adapter.prepare(), Err(GridError::Configuration(_))));
    }

    #[test]
    fn test_invalid_operator_leaves_adapter_unprepared() {
        let mut filter = Filter::new(LogicalOp::And);
        filter.rules.insert(
            "id".into(),
            vec![FilterRule {
                operator: "<>".into(),
                value: json!(1),
            }],
        );
        let mut adapter = SelectAdapter::new(MockBackend::new())
            .with_grid(orders_grid(filter))
            .with_query(orders_query());

        assert!(matches!(adapter.prepare(), Err(GridError::InvalidOperator(_))));
        assert!(!adapter.is_prepared());
        assert_eq!(
            adapter.query().unwrap().build().unwrap(),
            orders_query().build().unwrap()
        );

        adapter.set_grid(orders_grid(Filter::default()));
        adapter.prepare().unwrap();
        assert!(adapter.is_prepared());
    }

    #[tokio::test]
    async fn test_fetch_data_renders_and_counts() {
        let backend = MockBackend::new()
            .respond(vec![
                vec![("o.id", json!(11)), ("o.customer.name", json!("Joe")), ("o.total", json!(5))],
                vec![("o.id", json!(12)), ("o.customer.name", Value::Null), ("o.total", json!(7))],
            ])
            .respond(vec![vec![("total", json!(12))]]);

        let mut adapter = SelectAdapter::new(backend)
            .with_grid(orders_grid(Filter::default()))
            .with_query(orders_query());
        adapter.fetch_data(None).await.unwrap();

        let result = adapter.result_set();
        assert_eq!(result.count_items(), 2);
        assert_eq!(result.count_items_total(), 12);
        assert_eq!(result.rows()[0]["customer"], json!("Joe"));
        assert_eq!(result.rows()[1]["customer"], Value::Null);
        assert_eq!(result.rows()[1]["total"], json!(7));
        assert!(result.summary().is_none());

        let executed = &adapter.backend_mut().executed;
        assert_eq!(executed.len(), 2);
        assert!(executed[0].ends_with("LIMIT 10 OFFSET 10"));
        assert!(executed[1].starts_with("SELECT COUNT(*) AS total FROM (SELECT o.*"));
    }

    #[tokio::test]
    async fn test_fetch_data_summary_and_interceptor() {
        let backend = MockBackend::new()
            .respond(vec![vec![("o.id", json!(1)), ("o.total", json!(5))]])
            .respond(vec![vec![("total", json!(1))]])
            .respond(vec![vec![("summary_value", json!(5))]]);

        let grid = orders_grid(Filter::default())
            .with_config(GridConfig::default().with_user_data_on_footer(true));
        let mut adapter = SelectAdapter::new(backend)
            .with_grid(grid)
            .with_query(orders_query());

        let drop_rows = |_: &crate::adapter::FetchContext<'_>, mut result: ResultSet| {
            result.rows_mut().clear();
            result
        };
        adapter.fetch_data(Some(&drop_rows)).await.unwrap();

        let result = adapter.result_set();
        assert_eq!(result.summary().unwrap()["total"], json!(5));
        assert!(result.is_empty());

        let executed = &adapter.backend_mut().executed;
        assert!(executed[2].starts_with("SELECT SUM(summary_value) AS summary_value FROM (SELECT o.total AS summary_value"));
    }

    #[tokio::test]
    async fn test_export_requires_row_id_column() {
        let mut adapter = SelectAdapter::new(MockBackend::new())
            .with_grid(orders_grid(Filter::default()))
            .with_query(orders_query());

        let items: Vec<ExportItem> = adapter.export(Vec::new()).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], ExportItem::Failed(GridError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_export_streams_keys_and_skips_missing() {
        let backend = MockBackend::new()
            .respond(vec![vec![("row_key", json!(1))], vec![("row_key", json!(2))], vec![("row_key", json!(3))]])
            .respond(vec![vec![("o.id", json!(1)), ("o.customer.name", json!("Ann"))]])
            .respond(vec![])
            .respond(vec![vec![("o.id", json!(3)), ("o.customer.name", json!("Eve"))]]);

        let grid = orders_grid(Filter::default()).with_config(GridConfig::default().with_row_id_column("id"));
        let mut adapter = SelectAdapter::new(backend)
            .with_grid(grid)
            .with_query(orders_query());

        let items: Vec<ExportItem> = adapter.export(Vec::new()).collect().await;
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], ExportItem::Total(3)));
        match (&items[1], &items[2]) {
            (ExportItem::Row(first), ExportItem::Row(second)) => {
                assert_eq!(first["customer"], json!("Ann"));
                assert_eq!(second["customer"], json!("Eve"));
            }
            other => panic!("unexpected items: {:?}", other),
        }

        let executed = &adapter.backend_mut().executed;
        assert!(executed[0].starts_with("SELECT DISTINCT o.id AS row_key FROM orders o"));
        assert!(executed[1].ends_with("WHERE o.id = 1 LIMIT 1"));
    }

    #[tokio::test]
    async fn test_export_with_selected_keys() {
        let backend = MockBackend::new().respond(vec![vec![("o.id", json!(7)), ("o.customer.name", json!("Bob"))]]);
        let filter = Filter::new(LogicalOp::And).rule("customer", FilterOperator::Equal, "Ann");
        let grid = orders_grid(filter).with_config(GridConfig::default().with_row_id_column("o.id"));
        let mut adapter = SelectAdapter::new(backend)
            .with_grid(grid)
            .with_query(orders_query());

        let items: Vec<ExportItem> = adapter.export(vec![json!(7)]).collect().await;
        assert!(matches!(items[0], ExportItem::Total(1)));
        assert!(matches!(&items[1], ExportItem::Row(row) if row["id"] == json!(7) && row["customer"] == json!("Bob")));

        let executed = &adapter.backend_mut().executed;
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("LEFT JOIN customers c"));
        assert!(executed[0].contains("c.name AS \"o.customer.name\""));
        assert!(executed[0].ends_with("WHERE o.id = 7 LIMIT 1"), "{}", executed[0]);
        assert!(!executed[0].contains("'Ann'"));
    }
}
