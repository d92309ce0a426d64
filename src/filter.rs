//! Filter criteria sent by the grid client.
//!
//! ```json
//! {"operator": "and", "rules": {"name": [{"operator": "~", "value": "jo"}]}}
//! ```

use crate::builder::LogicalOp;
use crate::error::{GridError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Rule operator codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    BeginsWith,
    NotBeginsWith,
    EndsWith,
    NotEndsWith,
    /// Free-text search: every word of the value is matched separately.
    Contains,
    NotContains,
    In,
    NotIn,
}

impl FilterOperator {
    pub fn code(self) -> &'static str {
        match self {
            FilterOperator::Equal => "==",
            FilterOperator::NotEqual => "!=",
            FilterOperator::Less => "<",
            FilterOperator::LessOrEqual => "<=",
            FilterOperator::Greater => ">",
            FilterOperator::GreaterOrEqual => ">=",
            FilterOperator::BeginsWith => "^",
            FilterOperator::NotBeginsWith => "!^",
            FilterOperator::EndsWith => "$",
            FilterOperator::NotEndsWith => "!$",
            FilterOperator::Contains => "~",
            FilterOperator::NotContains => "!~",
            FilterOperator::In => "|",
            FilterOperator::NotIn => "!|",
        }
    }

    /// Whether the value is split into words before comparison.
    pub fn splits_words(self) -> bool {
        matches!(self, FilterOperator::Contains | FilterOperator::NotContains)
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            FilterOperator::Less | FilterOperator::LessOrEqual | FilterOperator::Greater | FilterOperator::GreaterOrEqual
        )
    }

    /// Negated operators also match missing values.
    pub fn is_negated(self) -> bool {
        matches!(
            self,
            FilterOperator::NotEqual
                | FilterOperator::NotBeginsWith
                | FilterOperator::NotEndsWith
                | FilterOperator::NotContains
                | FilterOperator::NotIn
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for FilterOperator {
    type Err = GridError;

    fn from_str(code: &str) -> Result<Self> {
        let operator = match code {
            "==" => FilterOperator::Equal,
            "!=" => FilterOperator::NotEqual,
            "<" => FilterOperator::Less,
            "<=" => FilterOperator::LessOrEqual,
            ">" => FilterOperator::Greater,
            ">=" => FilterOperator::GreaterOrEqual,
            "^" => FilterOperator::BeginsWith,
            "!^" => FilterOperator::NotBeginsWith,
            "$" => FilterOperator::EndsWith,
            "!$" => FilterOperator::NotEndsWith,
            "~" => FilterOperator::Contains,
            "!~" => FilterOperator::NotContains,
            "|" => FilterOperator::In,
            "!|" => FilterOperator::NotIn,
            other => return Err(GridError::InvalidOperator(other.to_string())),
        };
        Ok(operator)
    }
}

/// One `{operator, value}` entry. The operator is kept as sent and validated
/// when the filter is translated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

impl FilterRule {
    pub fn new(operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            operator: operator.code().to_string(),
            value: value.into(),
        }
    }

    pub fn parsed_operator(&self) -> Result<FilterOperator> {
        self.operator.parse()
    }

    /// Value as text; numbers and booleans are printed, `null` is empty.
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(scalar_text)
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        }
    }

    /// Members of an `in` list: array items, or a comma separated string.
    pub fn value_list(&self) -> Vec<String> {
        match &self.value {
            Value::Array(items) => items.iter().map(scalar_text).collect(),
            Value::Null => Vec::new(),
            _ => self
                .value_text()
                .split(',')
                .map(|part| part.trim().to_string())
                .collect(),
        }
    }

    /// De-duplicated words of the value.
    pub fn words(&self) -> Vec<String> {
        split_words(&self.value_text())
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Split on whitespace, dropping empty tokens and repeated words.
pub fn split_words(text: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        if !words.iter().any(|w| w == word) {
            words.push(word.to_string());
        }
    }
    words
}

/// Grid combinator plus per-column rule lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, alias = "groupOp")]
    pub operator: LogicalOp,
    #[serde(default)]
    pub rules: BTreeMap<String, Vec<FilterRule>>,
}

impl Filter {
    pub fn new(operator: LogicalOp) -> Self {
        Self {
            operator,
            rules: BTreeMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add a rule for a column.
    pub fn rule(
        mut self,
        column: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.rules
            .entry(column.into())
            .or_default()
            .push(FilterRule::new(operator, value));
        self
    }

    pub fn rules_for(&self, column: &str) -> &[FilterRule] {
        self.rules.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }
}
