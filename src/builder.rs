use crate::column::SearchType;
use crate::error::Result;
use crate::translate::GridQuery;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operators for WHERE clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonOp::Eq => write!(f, "="),
            ComparisonOp::Ne => write!(f, "<>"),
            ComparisonOp::Lt => write!(f, "<"),
            ComparisonOp::Le => write!(f, "<="),
            ComparisonOp::Gt => write!(f, ">"),
            ComparisonOp::Ge => write!(f, ">="),
            ComparisonOp::Like => write!(f, "LIKE"),
            ComparisonOp::NotLike => write!(f, "NOT LIKE"),
            ComparisonOp::In => write!(f, "IN"),
            ComparisonOp::NotIn => write!(f, "NOT IN"),
            ComparisonOp::IsNull => write!(f, "IS NULL"),
            ComparisonOp::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Logical operators for combining conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    #[default]
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "AND"),
            LogicalOp::Or => write!(f, "OR"),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = crate::error::GridError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(crate::error::GridError::InvalidArgument(format!(
                "unknown sort direction '{}'",
                other
            ))),
        }
    }
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Aggregate function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn to_sql(&self, column: &str) -> String {
        match self {
            AggregateFunc::Count => format!("COUNT({})", column),
            AggregateFunc::Sum => format!("SUM({})", column),
            AggregateFunc::Avg => format!("AVG({})", column),
            AggregateFunc::Min => format!("MIN({})", column),
            AggregateFunc::Max => format!("MAX({})", column),
        }
    }
}

/// Left-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A single field path such as `u.name`.
    Field(String),
    /// Null-safe concatenation of several fields, compared as one string.
    Concat(Vec<String>),
}

impl Operand {
    pub fn to_sql(&self) -> String {
        match self {
            Operand::Field(field) => field.clone(),
            Operand::Concat(fields) if fields.len() == 1 => fields[0].clone(),
            Operand::Concat(fields) => {
                let parts = fields
                    .iter()
                    .map(|f| format!("COALESCE(CAST({} AS TEXT), '')", f))
                    .collect::<Vec<_>>()
                    .join(" || ");
                format!("({})", parts)
            }
        }
    }
}

impl From<&str> for Operand {
    fn from(field: &str) -> Self {
        Operand::Field(field.to_string())
    }
}

impl From<String> for Operand {
    fn from(field: String) -> Self {
        Operand::Field(field)
    }
}

/// WHERE / HAVING condition tree.
///
/// The SQL backend renders it with [`Condition::to_sql`]; the in-memory backend
/// evaluates the same tree against rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Simple {
        column: Operand,
        op: ComparisonOp,
        value: Option<Value>,
    },
    Compound {
        conditions: Vec<Condition>,
        op: LogicalOp,
    },
    Raw(String),
}

impl Condition {
    pub fn simple(column: impl Into<Operand>, op: ComparisonOp, value: Value) -> Self {
        Condition::Simple {
            column: column.into(),
            op,
            value: Some(value),
        }
    }

    pub fn is_null(column: impl Into<Operand>) -> Self {
        Condition::Simple {
            column: column.into(),
            op: ComparisonOp::IsNull,
            value: None,
        }
    }

    /// Combine conditions, collapsing a single member into itself.
    pub fn combine(mut conditions: Vec<Condition>, op: LogicalOp) -> Self {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::Compound { conditions, op }
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Condition::Simple { column, op, value } => {
                let column = column.to_sql();
                let literal = || value.as_ref().map_or_else(|| "NULL".to_string(), format_value);
                match op {
                    ComparisonOp::IsNull | ComparisonOp::IsNotNull => format!("{} {}", column, op),
                    ComparisonOp::In | ComparisonOp::NotIn => {
                        let list = match value {
                            Some(Value::Array(items)) => {
                                items.iter().map(format_value).collect::<Vec<_>>().join(", ")
                            }
                            Some(other) => format_value(other),
                            None => String::new(),
                        };
                        format!("{} {} ({})", column, op, list)
                    }
                    ComparisonOp::Like | ComparisonOp::NotLike => {
                        format!("{} {} {} ESCAPE '\\'", column, op, literal())
                    }
                    _ => format!("{} {} {}", column, op, literal()),
                }
            }
            Condition::Compound { conditions, .. } if conditions.is_empty() => "TRUE".to_string(),
            Condition::Compound { conditions, op } => {
                let separator = format!(" {} ", op);
                let parts: Vec<String> = conditions.iter().map(Condition::to_sql).collect();
                format!("({})", parts.join(&separator))
            }
            Condition::Raw(sql) => sql.clone(),
        }
    }
}

/// Join clause
#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    /// Relation path the alias stands for, e.g. `o.customer`.
    pub relation: Option<String>,
    pub on_condition: Condition,
}

impl Join {
    pub fn to_sql(&self) -> String {
        match &self.alias {
            Some(alias) => format!(
                "{} {} {} ON {}",
                self.join_type,
                self.table,
                alias,
                self.on_condition.to_sql()
            ),
            None => format!("{} {} ON {}", self.join_type, self.table, self.on_condition.to_sql()),
        }
    }
}

/// ORDER BY clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn to_sql(&self) -> String {
        format!("{} {}", self.column, self.direction)
    }
}

/// SELECT query builder
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    table: String,
    alias: Option<String>,
    columns: Vec<String>,
    joins: Vec<Join>,
    where_clause: Option<Condition>,
    group_by: Vec<String>,
    having: Option<Condition>,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
    distinct: bool,
}

impl SelectBuilder {
    /// Create a new SELECT query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            columns: vec!["*".to_string()],
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// Alias of the root table (`FROM users u`)
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Select specific columns
    pub fn select(mut self, columns: Vec<impl Into<String>>) -> Self {
        self.columns = columns.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add an AND condition to existing WHERE
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.push_where(condition);
        self
    }

    /// Add an AND condition to existing HAVING
    pub fn and_having(mut self, condition: Condition) -> Self {
        self.push_having(condition);
        self
    }

    /// Add a JOIN clause
    pub fn join(
        mut self,
        join_type: JoinType,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: Condition,
    ) -> Self {
        self.joins.push(Join {
            join_type,
            table: table.into(),
            alias: Some(alias.into()),
            relation: None,
            on_condition: on,
        });
        self
    }

    /// Add a LEFT JOIN whose alias stands for a relation path such as `o.customer`
    pub fn left_join_relation(
        mut self,
        table: impl Into<String>,
        alias: impl Into<String>,
        relation: impl Into<String>,
        on: Condition,
    ) -> Self {
        self.joins.push(Join {
            join_type: JoinType::Left,
            table: table.into(),
            alias: Some(alias.into()),
            relation: Some(relation.into()),
            on_condition: on,
        });
        self
    }

    /// Add a LEFT JOIN
    pub fn left_join(self, table: impl Into<String>, alias: impl Into<String>, on: Condition) -> Self {
        self.join(JoinType::Left, table, alias, on)
    }

    /// Add GROUP BY columns
    pub fn group_by(mut self, columns: Vec<impl Into<String>>) -> Self {
        self.group_by = columns.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add ORDER BY
    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy::new(column, direction));
        self
    }

    /// Add ascending ORDER BY
    pub fn order_asc(self, column: impl Into<String>) -> Self {
        self.order_by(column, SortDirection::Asc)
    }

    /// Add descending ORDER BY
    pub fn order_desc(self, column: impl Into<String>) -> Self {
        self.order_by(column, SortDirection::Desc)
    }

    /// Set LIMIT
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set OFFSET
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn root_alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn where_condition(&self) -> Option<&Condition> {
        self.where_clause.as_ref()
    }

    pub fn having_condition(&self) -> Option<&Condition> {
        self.having.as_ref()
    }

    pub fn page(&self) -> (Option<usize>, Option<usize>) {
        (self.limit, self.offset)
    }

    /// Qualify a bare field with the root alias.
    pub fn qualify(&self, field: &str) -> String {
        match &self.alias {
            Some(alias) if !field.contains('.') => format!("{}.{}", alias, field),
            _ => field.to_string(),
        }
    }

    /// Append a labelled projection, keeping an existing `*`.
    pub fn project(&mut self, expression: &str, label: &str) {
        let projection = format!("{} AS {}", expression, quote_label(label));
        if !self.columns.contains(&projection) {
            self.columns.push(projection);
        }
    }

    /// Same query without ORDER BY, LIMIT and OFFSET.
    pub fn unpaged(&self) -> Self {
        let mut query = self.clone();
        query.order_by.clear();
        query.limit = None;
        query.offset = None;
        query
    }

    /// `SELECT COUNT(*)` over the filtered, unpaginated query.
    pub fn count_query(&self) -> Result<String> {
        let inner = self.unpaged().build()?;
        Ok(format!(
            "SELECT COUNT(*) AS total FROM ({}) AS grid_count",
            inner
        ))
    }

    /// Aggregate of one expression over the filtered, unpaginated query.
    pub fn summary_query(&self, func: AggregateFunc, expression: &str) -> Result<String> {
        let mut inner = self.unpaged();
        inner.columns = vec![format!("{} AS summary_value", expression)];
        Ok(format!(
            "SELECT {} AS summary_value FROM ({}) AS grid_summary",
            func.to_sql("summary_value"),
            inner.build()?
        ))
    }

    /// Distinct row keys of the filtered, unpaginated query.
    pub fn key_query(&self, key_expression: &str) -> Result<String> {
        let mut inner = self.unpaged();
        inner.columns = vec![format!("{} AS row_key", key_expression)];
        inner.distinct = true;
        inner.build()
    }

    /// Build the SQL query string
    pub fn build(&self) -> Result<String> {
        let mut sql = String::from("SELECT ");

        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        sql.push_str(&self.columns.join(", "));
        sql.push_str(&format!(" FROM {}", self.table));
        if let Some(alias) = &self.alias {
            sql.push_str(&format!(" {}", alias));
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.to_sql());
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(&having.to_sql());
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(
                &self
                    .order_by
                    .iter()
                    .map(|o| o.to_sql())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok(sql)
    }

    fn push_where(&mut self, condition: Condition) {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => Condition::Compound {
                conditions: vec![existing, condition],
                op: LogicalOp::And,
            },
            None => condition,
        });
    }

    fn push_having(&mut self, condition: Condition) {
        self.having = Some(match self.having.take() {
            Some(existing) => Condition::Compound {
                conditions: vec![existing, condition],
                op: LogicalOp::And,
            },
            None => condition,
        });
    }
}

impl GridQuery for SelectBuilder {
    fn apply_filter(&mut self, condition: Condition, search_type: SearchType) {
        match search_type {
            SearchType::Where => self.push_where(condition),
            SearchType::Having => self.push_having(condition),
        }
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

/// Escape LIKE metacharacters so user input matches literally (`ESCAPE '\'`).
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn quote_label(label: &str) -> String {
    format!("\"{}\"", label.replace('"', "\"\""))
}

/// Format a JSON value for SQL
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(_) | Value::Object(_) => {
            format!("'{}'", serde_json::to_string(value).unwrap_or_default().replace('\'', "''"))
        }
    }
}
