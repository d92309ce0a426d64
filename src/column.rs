//! Grid column model.
//!
//! A column pairs an output name with a source identifier, rendering
//! attributes and a render function. Concat columns derive their value from
//! several identifiers; [`Column::filter_targets`], [`Column::search_operand`]
//! and [`Column::sort_keys`] expose that uniformly to the translator.

use crate::builder::{AggregateFunc, LogicalOp, Operand, OrderBy, SortDirection};
use crate::render::{normalize_temporal, value_to_text};
use crate::row::{resolve, AliasMap, RowData};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Footer aggregate computed for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    Sum,
    Min,
    Max,
    Avg,
    Count,
}

impl SummaryType {
    pub fn aggregate_func(self) -> AggregateFunc {
        match self {
            SummaryType::Sum => AggregateFunc::Sum,
            SummaryType::Min => AggregateFunc::Min,
            SummaryType::Max => AggregateFunc::Max,
            SummaryType::Avg => AggregateFunc::Avg,
            SummaryType::Count => AggregateFunc::Count,
        }
    }
}

/// Clause a column's filter is attached to (relational backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Where,
    Having,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnFormat {
    /// Filter values are locale dates converted to `YYYY-MM-DD`.
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAttributes {
    pub is_searchable: bool,
    pub is_sortable: bool,
    pub is_hidden: bool,
    pub format: Option<ColumnFormat>,
    pub summary_type: Option<SummaryType>,
    /// How several words or conditions against this column combine.
    pub search_group_operator: LogicalOp,
    pub search_type: SearchType,
}

impl Default for ColumnAttributes {
    fn default() -> Self {
        Self {
            is_searchable: true,
            is_sortable: true,
            is_hidden: false,
            format: None,
            summary_type: None,
            search_group_operator: LogicalOp::Or,
            search_type: SearchType::Where,
        }
    }
}

pub type RenderFn = Arc<dyn Fn(&Value, &RowData) -> Value + Send + Sync>;
pub type VisibilityFn = Arc<dyn Fn(&RowData) -> bool + Send + Sync>;

/// How a column produces its display value.
#[derive(Clone)]
pub enum ColumnKind {
    /// The resolved value, with optional literal replacements.
    Text { replacements: Vec<(String, String)> },
    /// Values of several identifiers joined by `separator`.
    Concat {
        identifiers: Vec<String>,
        separator: String,
    },
    /// `template` filled with `href` and the text (or the value).
    Link {
        href: String,
        text: Option<String>,
        template: String,
    },
    Custom(RenderFn),
}

impl fmt::Debug for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Text { replacements } => f
                .debug_struct("Text")
                .field("replacements", replacements)
                .finish(),
            ColumnKind::Concat {
                identifiers,
                separator,
            } => f
                .debug_struct("Concat")
                .field("identifiers", identifiers)
                .field("separator", separator)
                .finish(),
            ColumnKind::Link {
                href,
                text,
                template,
            } => f
                .debug_struct("Link")
                .field("href", href)
                .field("text", text)
                .field("template", template)
                .finish(),
            ColumnKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

pub const DEFAULT_LINK_TEMPLATE: &str = "<a href=\"%s\">%s</a>";

#[derive(Clone)]
pub struct Column {
    name: String,
    identifier: String,
    attributes: ColumnAttributes,
    kind: ColumnKind,
    visibility: Option<VisibilityFn>,
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("attributes", &self.attributes)
            .field("kind", &self.kind)
            .field("visibility", &self.visibility.is_some())
            .finish()
    }
}

impl Column {
    fn with_kind(name: impl Into<String>, identifier: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            attributes: ColumnAttributes::default(),
            kind,
            visibility: None,
        }
    }

    pub fn text(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            identifier,
            ColumnKind::Text {
                replacements: Vec::new(),
            },
        )
    }

    pub fn concat(
        name: impl Into<String>,
        identifiers: Vec<impl Into<String>>,
        separator: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let identifiers: Vec<String> = identifiers.into_iter().map(Into::into).collect();
        Self::with_kind(
            name.clone(),
            name,
            ColumnKind::Concat {
                identifiers,
                separator: separator.into(),
            },
        )
    }

    pub fn link(
        name: impl Into<String>,
        identifier: impl Into<String>,
        href: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            name,
            identifier,
            ColumnKind::Link {
                href: href.into(),
                text: None,
                template: DEFAULT_LINK_TEMPLATE.to_string(),
            },
        )
    }

    pub fn custom<F>(name: impl Into<String>, identifier: impl Into<String>, render: F) -> Self
    where
        F: Fn(&Value, &RowData) -> Value + Send + Sync + 'static,
    {
        Self::with_kind(name, identifier, ColumnKind::Custom(Arc::new(render)))
    }

    pub fn with_attributes(mut self, attributes: ColumnAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn searchable(mut self, searchable: bool) -> Self {
        self.attributes.is_searchable = searchable;
        self
    }

    pub fn sortable(mut self, sortable: bool) -> Self {
        self.attributes.is_sortable = sortable;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.attributes.is_hidden = hidden;
        self
    }

    pub fn format(mut self, format: ColumnFormat) -> Self {
        self.attributes.format = Some(format);
        self
    }

    pub fn summary(mut self, summary_type: SummaryType) -> Self {
        self.attributes.summary_type = Some(summary_type);
        self
    }

    pub fn search_group(mut self, operator: LogicalOp) -> Self {
        self.attributes.search_group_operator = operator;
        self
    }

    pub fn search_type(mut self, search_type: SearchType) -> Self {
        self.attributes.search_type = search_type;
        self
    }

    /// Literal replacement applied by text columns.
    pub fn replace(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        if let ColumnKind::Text { replacements } = &mut self.kind {
            replacements.push((from.into(), to.into()));
        }
        self
    }

    /// Fixed link text instead of the column value.
    pub fn link_text(mut self, label: impl Into<String>) -> Self {
        if let ColumnKind::Link { text, .. } = &mut self.kind {
            *text = Some(label.into());
        }
        self
    }

    /// Row-level predicate; the cell renders `null` when it returns false.
    pub fn visible_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RowData) -> bool + Send + Sync + 'static,
    {
        self.visibility = Some(Arc::new(predicate));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn attributes(&self) -> &ColumnAttributes {
        &self.attributes
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn is_valid(&self, row: &RowData) -> bool {
        self.visibility.as_ref().map_or(true, |predicate| predicate(row))
    }

    /// Source identifiers read by this column.
    pub fn source_identifiers(&self) -> Vec<&str> {
        match &self.kind {
            ColumnKind::Concat { identifiers, .. } => identifiers.iter().map(String::as_str).collect(),
            _ => vec![self.identifier.as_str()],
        }
    }

    /// Operands compared once each by ordinary filter rules.
    pub fn filter_targets(&self) -> Vec<Operand> {
        self.source_identifiers()
            .into_iter()
            .map(Operand::from)
            .collect()
    }

    /// Operand matched by free-text word searches.
    pub fn search_operand(&self) -> Operand {
        match &self.kind {
            ColumnKind::Concat { identifiers, .. } => Operand::Concat(identifiers.clone()),
            _ => Operand::Field(self.identifier.clone()),
        }
    }

    /// Ordering clauses for a requested direction; secondary parts sort ascending.
    pub fn sort_keys(&self, direction: SortDirection) -> Vec<OrderBy> {
        self.source_identifiers()
            .into_iter()
            .enumerate()
            .map(|(i, identifier)| {
                let direction = if i == 0 { direction } else { SortDirection::Asc };
                OrderBy::new(identifier, direction)
            })
            .collect()
    }

    /// Raw value for this column from a source row.
    pub fn resolve_value(&self, row: &RowData, aliases: Option<&AliasMap>) -> Value {
        match &self.kind {
            ColumnKind::Concat {
                identifiers,
                separator,
            } => {
                let parts: Vec<String> = identifiers
                    .iter()
                    .map(|identifier| value_to_text(&normalize_temporal(resolve(identifier, row, aliases))))
                    .filter(|text| !text.is_empty())
                    .collect();
                if parts.is_empty() {
                    Value::Null
                } else {
                    Value::String(parts.join(separator))
                }
            }
            _ => normalize_temporal(resolve(&self.identifier, row, aliases)),
        }
    }

    /// Display value before template substitution.
    pub fn render_value(&self, value: Value, row: &RowData) -> Value {
        match &self.kind {
            ColumnKind::Text { replacements } => match value {
                Value::String(mut text) if !replacements.is_empty() => {
                    for (from, to) in replacements {
                        text = text.replace(from.as_str(), to);
                    }
                    Value::String(text)
                }
                other => other,
            },
            ColumnKind::Concat { .. } => value,
            ColumnKind::Link {
                href,
                text,
                template,
            } => {
                let label = match text {
                    Some(label) => label.clone(),
                    None if value.is_null() => return Value::Null,
                    None => value_to_text(&value),
                };
                Value::String(fill_link_template(template, href, &label))
            }
            ColumnKind::Custom(render) => render(&value, row),
        }
    }
}

/// Put `href` and `label` into the first two `%s` slots of `template`.
fn fill_link_template(template: &str, href: &str, label: &str) -> String {
    let mut parts = template.splitn(3, "%s");
    let mut out = String::with_capacity(template.len() + href.len() + label.len());
    out.push_str(parts.next().unwrap_or_default());
    if let Some(part) = parts.next() {
        out.push_str(href);
        out.push_str(part);
    }
    if let Some(part) = parts.next() {
        out.push_str(label);
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> RowData {
        RowData::from(json!({"id": 3, "first_name": "Jo", "last_name": "Novak", "state": "active"}))
    }

    #[test]
    fn test_default_attributes() {
        let column = Column::text("name", "u.name");
        assert!(column.attributes().is_searchable);
        assert!(column.attributes().is_sortable);
        assert!(!column.attributes().is_hidden);
        assert_eq!(column.attributes().search_group_operator, LogicalOp::Or);
        assert_eq!(column.attributes().search_type, SearchType::Where);
    }

    #[test]
    fn test_concat_targets_and_sort_keys() {
        let column = Column::concat("full_name", vec!["u.first_name", "u.last_name"], " ");

        assert_eq!(
            column.filter_targets(),
            vec![Operand::from("u.first_name"), Operand::from("u.last_name")]
        );
        assert_eq!(
            column.search_operand(),
            Operand::Concat(vec!["u.first_name".into(), "u.last_name".into()])
        );
        assert_eq!(
            column.sort_keys(SortDirection::Desc),
            vec![
                OrderBy::new("u.first_name", SortDirection::Desc),
                OrderBy::new("u.last_name", SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn test_text_targets() {
        let column = Column::text("name", "u.name");
        assert_eq!(column.filter_targets(), vec![Operand::from("u.name")]);
        assert_eq!(column.search_operand(), Operand::from("u.name"));
        assert_eq!(
            column.sort_keys(SortDirection::Desc),
            vec![OrderBy::new("u.name", SortDirection::Desc)]
        );
    }

    #[test]
    fn test_concat_resolves_and_joins() {
        let column = Column::concat("full_name", vec!["u.first_name", "u.missing", "u.last_name"], " ");
        assert_eq!(column.resolve_value(&person(), None), json!("Jo Novak"));
    }

    #[test]
    fn test_text_replacements() {
        let column = Column::text("state", "u.state").replace("active", "Active user");
        let row = person();
        let value = column.resolve_value(&row, None);
        assert_eq!(column.render_value(value, &row), json!("Active user"));
    }

    #[test]
    fn test_link_render() {
        let column = Column::link("edit", "u.first_name", "/users/%id%");
        let row = person();
        let value = column.resolve_value(&row, None);
        assert_eq!(
            column.render_value(value, &row),
            json!("<a href=\"/users/%id%\">Jo</a>")
        );

        let fixed = Column::link("edit", "u.nope", "/users/%id%").link_text("Edit");
        assert_eq!(
            fixed.render_value(Value::Null, &row),
            json!("<a href=\"/users/%id%\">Edit</a>")
        );
        let empty = Column::link("edit", "u.nope", "/users/%id%");
        assert_eq!(empty.render_value(Value::Null, &row), Value::Null);
    }

    #[test]
    fn test_link_href_with_placeholder_text() {
        let column = Column::link("search", "u.first_name", "/search?q=%s");
        let row = person();
        let value = column.resolve_value(&row, None);
        assert_eq!(
            column.render_value(value, &row),
            json!("<a href=\"/search?q=%s\">Jo</a>")
        );

        assert_eq!(fill_link_template("%s", "/a", "A"), "/a");
        assert_eq!(fill_link_template("[%s|%s|%s]", "/a", "A"), "[/a|A|%s]");
    }

    #[test]
    fn test_custom_render_and_visibility() {
        let column = Column::custom("badge", "u.state", |value, _row| {
            json!(format!("[{}]", value.as_str().unwrap_or_default()))
        })
        .visible_when(|row| row.get("state").map_or(false, |s| s.to_value() == json!("active")));

        let row = person();
        assert!(column.is_valid(&row));
        assert_eq!(column.render_value(json!("active"), &row), json!("[active]"));

        let inactive = RowData::from(json!({"state": "banned"}));
        assert!(!column.is_valid(&inactive));
    }

    #[test]
    fn test_summary_type_maps_to_aggregate() {
        assert_eq!(SummaryType::Avg.aggregate_func(), AggregateFunc::Avg);
        assert_eq!(SummaryType::Count.aggregate_func(), AggregateFunc::Count);
    }
}
