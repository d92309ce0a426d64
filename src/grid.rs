//! The grid: columns, request parameters and configuration.

use crate::builder::SortDirection;
use crate::column::Column;
use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::filter::Filter;
use serde_json::Value;

/// Paging, sorting and filtering requested by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    /// 1-based page number.
    pub page: usize,
    /// Rows per page; `None` falls back to the configured default.
    pub page_size: Option<usize>,
    pub sort: Vec<(String, SortDirection)>,
    pub filter: Filter,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: None,
            sort: Vec::new(),
            filter: Filter::default(),
        }
    }
}

impl GridParams {
    /// Parse jqGrid request parameters.
    ///
    /// Accepts `page`, `rows`, `sidx` (`"a asc, b"`), `sord` and `filters` given
    /// either as an object or as a JSON string. Numbers may arrive as strings.
    /// An empty `sidx` means no sort.
    pub fn from_request(request: &Value) -> Result<Self> {
        let Value::Object(map) = request else {
            return Err(GridError::InvalidArgument(
                "request parameters must be an object".to_string(),
            ));
        };

        let mut params = GridParams::default();

        if let Some(page) = map.get("page") {
            params.page = parse_count("page", page)?.unwrap_or(1).max(1);
        }
        if let Some(rows) = map.get("rows") {
            params.page_size = parse_count("rows", rows)?;
        }

        let default_direction = match map.get("sord").and_then(Value::as_str) {
            Some(sord) if !sord.trim().is_empty() => sord.parse()?,
            _ => SortDirection::Asc,
        };
        if let Some(sidx) = map.get("sidx").and_then(Value::as_str) {
            params.sort = parse_sort(sidx, default_direction)?;
        }

        match map.get("filters") {
            Some(Value::String(json)) if !json.trim().is_empty() => {
                params.filter = Filter::from_json(json)?;
            }
            Some(filters @ Value::Object(_)) => {
                params.filter = serde_json::from_value(filters.clone())?;
            }
            _ => {}
        }

        Ok(params)
    }
}

fn parse_count(key: &str, value: &Value) -> Result<Option<usize>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| GridError::InvalidArgument(format!("'{}' must be a non-negative integer", key))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| GridError::InvalidArgument(format!("'{}' must be a non-negative integer", key))),
        _ => Err(GridError::InvalidArgument(format!("'{}' must be a number", key))),
    }
}

/// `"a asc, b"` with `sord = desc` sorts by `a ASC, b DESC`.
fn parse_sort(sidx: &str, default_direction: SortDirection) -> Result<Vec<(String, SortDirection)>> {
    let mut sort = Vec::new();
    for part in sidx.split(',') {
        let mut tokens = part.split_whitespace();
        let Some(column) = tokens.next() else {
            continue;
        };
        let direction = match tokens.next() {
            Some(direction) => direction.parse()?,
            None => default_direction,
        };
        sort.push((column.to_string(), direction));
    }
    Ok(sort)
}

/// Column list plus the current request.
#[derive(Debug, Clone)]
pub struct Grid {
    name: String,
    columns: Vec<Column>,
    params: GridParams,
    config: GridConfig,
}

impl Grid {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            params: GridParams::default(),
            config: GridConfig::default(),
        }
    }

    /// Add a column; a column with the same name is replaced.
    pub fn column(mut self, column: Column) -> Self {
        self.add_column(column);
        self
    }

    pub fn add_column(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name() == column.name()) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    pub fn with_config(mut self, config: GridConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_params(mut self, params: GridParams) -> Self {
        self.params = params;
        self
    }

    pub fn set_params(&mut self, params: GridParams) {
        self.params = params;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn params(&self) -> &GridParams {
        &self.params
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn page(&self) -> usize {
        self.params.page.max(1)
    }

    /// Effective page size; 0 disables paging.
    pub fn page_size(&self) -> usize {
        self.params.page_size.unwrap_or(self.config.default_page_size)
    }

    pub fn filter(&self) -> &Filter {
        &self.params.filter
    }

    pub fn sort(&self) -> &[(String, SortDirection)] {
        &self.params.sort
    }
}
