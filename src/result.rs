//! Fetched page, footer summaries and the jqGrid JSON response.

use crate::column::SummaryType;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Column name to rendered value.
pub type RenderedRow = Map<String, Value>;

/// Output of one fetch; rebuilt every time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    rows: Vec<RenderedRow>,
    count_items_total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<Map<String, Value>>,
}

impl ResultSet {
    pub fn new(rows: Vec<RenderedRow>, count_items_total: usize) -> Self {
        Self {
            rows,
            count_items_total,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: Map<String, Value>) -> Self {
        self.set_summary(summary);
        self
    }

    /// Attach footer values; an empty map clears them.
    pub fn set_summary(&mut self, summary: Map<String, Value>) {
        self.summary = (!summary.is_empty()).then_some(summary);
    }

    pub fn rows(&self) -> &[RenderedRow] {
        &self.rows
    }

    /// Mutable rows for interceptors.
    pub fn rows_mut(&mut self) -> &mut Vec<RenderedRow> {
        &mut self.rows
    }

    /// Rows on this page.
    pub fn count_items(&self) -> usize {
        self.rows.len()
    }

    pub fn count_items_total(&self) -> usize {
        self.count_items_total
    }

    pub fn summary(&self) -> Option<&Map<String, Value>> {
        self.summary.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// jqGrid response for the given page.
    pub fn to_response(&self, page: usize, page_size: usize) -> JqGridResponse {
        JqGridResponse {
            page,
            total: total_pages(self.count_items_total, page_size),
            records: self.count_items_total,
            rows: self
                .rows
                .iter()
                .enumerate()
                .map(|(index, cell)| JqGridRow {
                    id: index + 1,
                    cell: cell.clone(),
                })
                .collect(),
            userdata: self.summary.clone(),
        }
    }
}

/// Number of pages; one page when paging is disabled and rows exist.
pub fn total_pages(records: usize, page_size: usize) -> usize {
    if page_size == 0 {
        usize::from(records > 0)
    } else {
        records.div_ceil(page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JqGridRow {
    /// 1-based position on the page.
    pub id: usize,
    pub cell: RenderedRow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JqGridResponse {
    pub page: usize,
    pub total: usize,
    pub records: usize,
    pub rows: Vec<JqGridRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userdata: Option<Map<String, Value>>,
}

impl JqGridResponse {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Aggregate raw column values. Arrays are flattened and nulls ignored; no
/// values means no aggregate.
pub fn aggregate(summary_type: SummaryType, values: &[Value]) -> Option<Value> {
    let mut present = Vec::new();
    flatten_present(values, &mut present);
    if present.is_empty() {
        return None;
    }

    match summary_type {
        SummaryType::Count => Some(Value::from(present.len())),
        SummaryType::Sum => sum(&present),
        SummaryType::Avg => {
            let numbers: Vec<f64> = present.iter().filter_map(|v| as_number(v)).collect();
            if numbers.is_empty() {
                return None;
            }
            let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
            Number::from_f64(avg).map(Value::Number)
        }
        SummaryType::Min => extreme(&present, std::cmp::Ordering::Less),
        SummaryType::Max => extreme(&present, std::cmp::Ordering::Greater),
    }
}

fn flatten_present<'a>(values: &'a [Value], out: &mut Vec<&'a Value>) {
    for value in values {
        match value {
            Value::Null => {}
            Value::Array(items) => flatten_present(items, out),
            other => out.push(other),
        }
    }
}

/// Numeric view of a value; numeric strings count.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn sum(values: &[&Value]) -> Option<Value> {
    let integers: Option<Vec<i64>> = values.iter().map(|v| v.as_i64()).collect();
    if let Some(integers) = integers {
        return Some(Value::from(integers.iter().sum::<i64>()));
    }

    let numbers: Vec<f64> = values.iter().filter_map(|v| as_number(v)).collect();
    if numbers.is_empty() {
        return None;
    }
    Number::from_f64(numbers.iter().sum()).map(Value::Number)
}

fn extreme(values: &[&Value], wanted: std::cmp::Ordering) -> Option<Value> {
    let numeric: Option<Vec<f64>> = values.iter().map(|v| as_number(v)).collect();
    if numeric.is_some() {
        let mut best: Option<(&Value, f64)> = None;
        for value in values {
            if let Some(n) = as_number(value) {
                match best {
                    Some((_, current)) if n.partial_cmp(&current) != Some(wanted) => {}
                    _ => best = Some((*value, n)),
                }
            }
        }
        return best.map(|(value, _)| value.clone());
    }

    values
        .iter()
        .map(|v| crate::render::value_to_text(v))
        .reduce(|best, text| if text.cmp(&best) == wanted { text } else { best })
        .map(Value::String)
}
