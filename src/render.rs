//! Row rendering: resolve each column, normalize temporal values, apply the
//! column renderer and substitute `%field%` templates.

use crate::grid::Grid;
use crate::result::RenderedRow;
use crate::row::{resolve, AliasMap, RowData};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

/// Output format for date-time values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Token replaced by the row position.
pub const INDEX_TOKEN: &str = "_index";

/// Render one source row. `index` is the row position within the page (or stream).
pub fn render_row(grid: &Grid, row: &RowData, index: usize, aliases: Option<&AliasMap>) -> RenderedRow {
    let mut rendered = RenderedRow::new();

    for column in grid.columns() {
        let mut value = Value::Null;

        if column.is_valid(row) {
            let resolved = column.resolve_value(row, aliases);
            value = match column.render_value(resolved, row) {
                Value::String(text) => Value::String(substitute_template(&text, index, row, aliases)),
                other => other,
            };
        }

        rendered.insert(column.name().to_string(), value);
    }

    rendered
}

pub fn render_rows(grid: &Grid, rows: &[RowData], aliases: Option<&AliasMap>) -> Vec<RenderedRow> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| render_row(grid, row, index, aliases))
        .collect()
}

/// Replace `%token%` occurrences in a single left-to-right pass.
///
/// `%_index%` becomes `index`; any other token is resolved against the row and
/// replaced by its text, or by nothing when absent. A `%` that does not open a
/// valid token is copied through.
pub fn substitute_template(text: &str, index: usize, row: &RowData, aliases: Option<&AliasMap>) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('%') {
            Some(end) if is_token(&after[..end]) => {
                let token = &after[..end];
                if token == INDEX_TOKEN {
                    output.push_str(&index.to_string());
                } else {
                    output.push_str(&value_to_text(&normalize_temporal(resolve(token, row, aliases))));
                }
                rest = &after[end + 1..];
            }
            _ => {
                output.push('%');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

fn is_token(candidate: &str) -> bool {
    let body = candidate.strip_prefix('_').unwrap_or(candidate);
    !body.is_empty()
        && body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Rewrite ISO 8601 / RFC 3339 date-time strings as `YYYY-MM-DD HH:MM:SS`.
pub fn normalize_temporal(value: Value) -> Value {
    if let Value::String(text) = &value {
        if let Some(datetime) = parse_datetime(text) {
            return Value::String(datetime.format(DATETIME_FORMAT).to_string());
        }
    }
    value
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    // cheap shape check before trying the parsers
    let bytes = text.as_bytes();
    if bytes.len() < 19 || bytes[4] != b'-' || !matches!(bytes[10], b'T' | b' ') {
        return None;
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Text form of a value used in templates and concatenations.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
