//! In-memory grid adapter.
//!
//! [`CollectionQuery`] collects the same [`Condition`] trees the SQL builder
//! renders and evaluates them directly against [`RowData`]. Comparisons are loose:
//! numeric text compares as a number, LIKE patterns match case-insensitively and
//! missing values only satisfy `IS NULL`.

use crate::adapter::{failed_stream, intercept, ExportItem, ExportStream, FetchInterceptor, GridAdapter};
use crate::builder::{ComparisonOp, Condition, LogicalOp, Operand, OrderBy, SortDirection};
use crate::column::SearchType;
use crate::error::{GridError, Result};
use crate::grid::Grid;
use crate::render::{render_row, value_to_text};
use crate::result::{aggregate, as_number, ResultSet};
use crate::row::{resolve, RowData};
use crate::translate::{translate, GridQuery};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use tracing::{debug, info};

const ADAPTER_NAME: &str = "collection";

/// Filter, ordering and page over an in-memory row set.
///
/// HAVING conditions are evaluated like WHERE conditions; rows are not grouped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionQuery {
    conditions: Vec<Condition>,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl CollectionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and_where(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy::new(column, direction));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn page(&self) -> (Option<usize>, Option<usize>) {
        (self.limit, self.offset)
    }

    pub fn matches(&self, row: &RowData) -> Result<bool> {
        for condition in &self.conditions {
            if !evaluate(condition, row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Matching rows in query order, before paging.
    pub fn filter_rows<'r>(&self, rows: &'r [RowData]) -> Result<Vec<&'r RowData>> {
        let mut matched = Vec::new();
        for row in rows {
            if self.matches(row)? {
                matched.push(row);
            }
        }

        if !self.order_by.is_empty() {
            matched.sort_by(|a, b| self.compare_rows(a, b));
        }
        Ok(matched)
    }

    /// Apply limit and offset.
    pub fn paginate<'r>(&self, rows: &[&'r RowData]) -> Vec<&'r RowData> {
        let offset = self.offset.unwrap_or(0);
        rows.iter()
            .skip(offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .copied()
            .collect()
    }

    fn compare_rows(&self, a: &RowData, b: &RowData) -> Ordering {
        for order in &self.order_by {
            let left = resolve(&order.column, a, None);
            let right = resolve(&order.column, b, None);
            let ordering = match (is_missing(&left), is_missing(&right)) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => compare_loose(&left, &right).unwrap_or(Ordering::Equal),
            };
            let ordering = match order.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl GridQuery for CollectionQuery {
    fn apply_filter(&mut self, condition: Condition, _search_type: SearchType) {
        self.conditions.push(condition);
    }

    fn take_order_by(&mut self) -> Vec<OrderBy> {
        std::mem::take(&mut self.order_by)
    }

    fn push_order_by(&mut self, order: OrderBy) {
        self.order_by.push(order);
    }

    fn set_page(&mut self, limit: usize, offset: usize) {
        self.limit = Some(limit);
        self.offset = Some(offset);
    }
}

/// Evaluate a condition tree against one row.
pub fn evaluate(condition: &Condition, row: &RowData) -> Result<bool> {
    match condition {
        Condition::Simple { column, op, value } => {
            let actual = operand_value(column, row);
            Ok(evaluate_simple(&actual, *op, value.as_ref().unwrap_or(&Value::Null)))
        }
        Condition::Compound { conditions, op } => {
            for condition in conditions {
                let matched = evaluate(condition, row)?;
                match op {
                    LogicalOp::And if !matched => return Ok(false),
                    LogicalOp::Or if matched => return Ok(true),
                    _ => {}
                }
            }
            Ok(conditions.is_empty() || *op == LogicalOp::And)
        }
        Condition::Raw(sql) => Err(GridError::InvalidArgument(format!(
            "raw SQL condition cannot be evaluated in memory: {}",
            sql
        ))),
    }
}

fn operand_value(operand: &Operand, row: &RowData) -> Value {
    match operand {
        Operand::Field(identifier) => resolve(identifier, row, None),
        Operand::Concat(identifiers) => Value::String(
            identifiers
                .iter()
                .map(|identifier| value_to_text(&resolve(identifier, row, None)))
                .collect(),
        ),
    }
}

fn evaluate_simple(actual: &Value, op: ComparisonOp, expected: &Value) -> bool {
    if is_missing(actual) {
        return op == ComparisonOp::IsNull;
    }

    // one-to-many values match when any member does
    let members: Vec<&Value> = match actual {
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        other => vec![other],
    };

    match op {
        ComparisonOp::IsNull => false,
        ComparisonOp::IsNotNull => true,
        ComparisonOp::Eq => any_member(&members, |m| loose_eq(m, expected)),
        ComparisonOp::Ne => !any_member(&members, |m| loose_eq(m, expected)),
        ComparisonOp::Lt => any_member(&members, |m| compare_loose(m, expected) == Some(Ordering::Less)),
        ComparisonOp::Le => any_member(&members, |m| {
            matches!(compare_loose(m, expected), Some(Ordering::Less | Ordering::Equal))
        }),
        ComparisonOp::Gt => any_member(&members, |m| compare_loose(m, expected) == Some(Ordering::Greater)),
        ComparisonOp::Ge => any_member(&members, |m| {
            matches!(compare_loose(m, expected), Some(Ordering::Greater | Ordering::Equal))
        }),
        ComparisonOp::Like => {
            let pattern = value_to_text(expected);
            any_member(&members, |m| like_match(&value_to_text(m), &pattern))
        }
        ComparisonOp::NotLike => {
            let pattern = value_to_text(expected);
            !any_member(&members, |m| like_match(&value_to_text(m), &pattern))
        }
        ComparisonOp::In => any_member(&members, |m| in_list(m, expected)),
        ComparisonOp::NotIn => !any_member(&members, |m| in_list(m, expected)),
    }
}

fn any_member(members: &[&Value], predicate: impl Fn(&Value) -> bool) -> bool {
    members.iter().any(|member| predicate(member))
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.iter().all(Value::is_null),
        _ => false,
    }
}

fn in_list(value: &Value, list: &Value) -> bool {
    match list {
        Value::Array(items) => items.iter().any(|item| loose_eq(value, item)),
        other => loose_eq(value, other),
    }
}

/// Numbers compare numerically (numeric text included), everything else as text.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => value_to_text(a) == value_to_text(b),
    }
}

fn compare_loose(a: &Value, b: &Value) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(value_to_text(a).cmp(&value_to_text(b))),
    }
}

/// Case-insensitive SQL LIKE with `\` as escape character.
///
/// `%` matches any run of characters, `_` exactly one.
pub fn like_match(value: &str, pattern: &str) -> bool {
    let value: Vec<char> = value.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    like_match_from(&value, &pattern)
}

fn like_match_from(value: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => value.is_empty(),
        Some(('%', rest)) => {
            if rest.is_empty() {
                return true;
            }
            (0..=value.len()).any(|skip| like_match_from(&value[skip..], rest))
        }
        Some(('_', rest)) => !value.is_empty() && like_match_from(&value[1..], rest),
        Some(('\\', rest)) => match (rest.split_first(), value.split_first()) {
            (Some((p, rest)), Some((c, value))) if p == c => like_match_from(value, rest),
            _ => false,
        },
        Some((p, rest)) => match value.split_first() {
            Some((c, value)) if c == p => like_match_from(value, rest),
            _ => false,
        },
    }
}

/// Grid adapter over rows held in memory.
#[derive(Debug, Default)]
pub struct CollectionAdapter {
    rows: Option<Vec<RowData>>,
    grid: Option<Grid>,
    query: CollectionQuery,
    prepared: Option<CollectionQuery>,
    result: ResultSet,
}

impl CollectionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, rows: Vec<RowData>) -> Self {
        self.set_rows(rows);
        self
    }

    /// Rows given as JSON objects.
    pub fn with_values(self, rows: Vec<Value>) -> Self {
        self.with_rows(rows.into_iter().map(RowData::from).collect())
    }

    pub fn with_grid(mut self, grid: Grid) -> Self {
        self.set_grid(grid);
        self
    }

    /// Base query the grid request is added to.
    pub fn with_query(mut self, query: CollectionQuery) -> Self {
        self.query = query;
        self.prepared = None;
        self
    }

    pub fn set_rows(&mut self, rows: Vec<RowData>) {
        self.rows = Some(rows);
    }

    pub fn set_grid(&mut self, grid: Grid) {
        self.grid = Some(grid);
        self.prepared = None;
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    /// Translated query once prepared, the base query before.
    pub fn query(&self) -> &CollectionQuery {
        self.prepared.as_ref().unwrap_or(&self.query)
    }

    fn parts(&self) -> Result<(&Grid, &CollectionQuery, &[RowData])> {
        let grid = self
            .grid
            .as_ref()
            .ok_or_else(|| GridError::Configuration("no grid attached to the adapter".to_string()))?;
        let rows = self
            .rows
            .as_deref()
            .ok_or_else(|| GridError::Configuration("no rows attached to the adapter".to_string()))?;
        let query = self
            .prepared
            .as_ref()
            .ok_or_else(|| GridError::Configuration("adapter is not prepared".to_string()))?;
        Ok((grid, query, rows))
    }
}

#[async_trait]
impl GridAdapter for CollectionAdapter {
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
        if self.rows.is_none() {
            return Err(GridError::Configuration("no rows attached to the adapter".to_string()));
        }

        self.prepared = Some(translate(&self.query, grid)?);
        Ok(())
    }

    async fn fetch_data(&mut self, interceptor: Option<&dyn FetchInterceptor>) -> Result<()> {
        self.prepare()?;
        let (grid, query, rows) = self.parts()?;

        let filtered = query.filter_rows(rows)?;
        let page = query.paginate(&filtered);
        let rendered = page
            .iter()
            .enumerate()
            .map(|(index, row)| render_row(grid, row, index, None))
            .collect();
        let mut result = ResultSet::new(rendered, filtered.len());

        if grid.config().user_data_on_footer {
            result.set_summary(summarize(grid, &filtered));
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
        let (grid, query, rows) = match self.parts() {
            Ok(parts) => parts,
            Err(error) => return failed_stream(error),
        };
        let Some(row_id_column) = grid.config().row_id_column.clone() else {
            return failed_stream(GridError::Configuration(
                "export requires a row id column".to_string(),
            ));
        };
        // selected keys are looked up without the grid filter
        let source = if keys.is_empty() { query } else { &self.query };
        let candidates = match source.filter_rows(rows) {
            Ok(candidates) => candidates,
            Err(error) => return failed_stream(error),
        };

        let keys = if keys.is_empty() {
            let mut distinct: Vec<Value> = Vec::new();
            for row in &candidates {
                let key = resolve(&row_id_column, row, None);
                if !key.is_null() && !distinct.iter().any(|k| loose_eq(k, &key)) {
                    distinct.push(key);
                }
            }
            distinct
        } else {
            keys
        };

        let total = std::iter::once(ExportItem::Total(keys.len()));
        let mut position = 0;
        let items = keys.into_iter().filter_map(move |key| {
            let Some(row) = candidates
                .iter()
                .find(|row| loose_eq(&resolve(&row_id_column, row, None), &key))
            else {
                debug!(adapter = ADAPTER_NAME, key = %key, "Export row no longer exists, skipping");
                return None;
            };
            let rendered = render_row(grid, row, position, None);
            position += 1;
            Some(ExportItem::Row(rendered))
        });

        Box::pin(futures::stream::iter(total.chain(items)))
    }
}

/// Aggregate resolved values of every filtered row.
fn summarize(grid: &Grid, rows: &[&RowData]) -> Map<String, Value> {
    let mut summary = Map::new();
    for column in grid.columns() {
        let attributes = column.attributes();
        let Some(summary_type) = attributes.summary_type else {
            continue;
        };
        if attributes.is_hidden {
            continue;
        }

        let values: Vec<Value> = rows.iter().map(|row| column.resolve_value(row, None)).collect();
        if let Some(value) = aggregate(summary_type, &values) {
            summary.insert(column.name().to_string(), value);
        }
    }
    summary
}
