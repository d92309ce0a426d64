//! Typed row data and field path resolution.
//!
//! Rows coming from either backend are converted into [`RowData`], a tagged union
//! of scalars, nested records and lists of records (one-to-many joins). Column
//! identifiers such as `o.customer.name` or `c_name` are resolved against it with
//! [`resolve`].

use crate::builder::SelectBuilder;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One row of source data.
#[derive(Debug, Clone, PartialEq)]
pub enum RowData {
    Scalar(Value),
    Record(BTreeMap<String, RowData>),
    List(Vec<RowData>),
}

impl RowData {
    pub fn record() -> Self {
        RowData::Record(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RowData::Scalar(Value::Null))
    }

    pub fn get(&self, key: &str) -> Option<&RowData> {
        match self {
            RowData::Record(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Build a nested record from flat `label -> value` pairs.
    ///
    /// A label `o.customer.name` drops its root segment and lands at
    /// `{customer: {name}}`; labels without a dot stay at the top level.
    pub fn from_labels<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut root = BTreeMap::new();
        for (label, value) in pairs {
            let label = label.as_ref();
            let segments: Vec<&str> = match label.split_once('.') {
                Some((_, rest)) => rest.split('.').collect(),
                None => vec![label],
            };
            insert_path(&mut root, &segments, value);
        }
        RowData::Record(root)
    }

    pub fn to_value(&self) -> Value {
        match self {
            RowData::Scalar(value) => value.clone(),
            RowData::Record(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect::<Map<String, Value>>(),
            ),
            RowData::List(items) => Value::Array(items.iter().map(RowData::to_value).collect()),
        }
    }
}

impl From<Value> for RowData {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                RowData::Record(map.into_iter().map(|(k, v)| (k, RowData::from(v))).collect())
            }
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                RowData::List(items.into_iter().map(RowData::from).collect())
            }
            other => RowData::Scalar(other),
        }
    }
}

fn insert_path(fields: &mut BTreeMap<String, RowData>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            let keeps_relation =
                value.is_null() && matches!(fields.get(*leaf), Some(RowData::Record(_)));
            if !keeps_relation {
                fields.insert(leaf.to_string(), RowData::Scalar(value));
            }
        }
        [head, rest @ ..] => {
            let slot = fields
                .entry(head.to_string())
                .or_insert_with(RowData::record);
            if slot.is_null() {
                *slot = RowData::record();
            }
            match slot {
                RowData::Record(nested) => insert_path(nested, rest, value),
                _ => {
                    fields.insert(segments.join("."), RowData::Scalar(value));
                }
            }
        }
    }
}

/// Join aliases of a relational query mapped to their relation paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    root: Option<String>,
    aliases: BTreeMap<String, String>,
}

impl AliasMap {
    pub fn new(root: Option<String>) -> Self {
        Self {
            root,
            aliases: BTreeMap::new(),
        }
    }

    /// Collect `alias -> relation` from the joins that declare a relation path.
    pub fn from_query(query: &SelectBuilder) -> Self {
        let mut map = Self::new(query.root_alias().map(String::from));
        for join in query.joins() {
            if let (Some(alias), Some(relation)) = (&join.alias, &join.relation) {
                map.insert(alias.clone(), relation.clone());
            }
        }
        map
    }

    pub fn insert(&mut self, alias: impl Into<String>, path: impl Into<String>) {
        self.aliases.insert(alias.into(), path.into());
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    fn is_known(&self, segment: &str) -> bool {
        self.aliases.contains_key(segment) || self.root.as_deref() == Some(segment)
    }

    /// Expand `c_name` / `c.name` into the full relation path `o.customer.name`.
    pub fn normalize(&self, identifier: &str) -> String {
        let mut identifier = identifier.to_string();

        if !identifier.contains('.') {
            if let Some((first, _)) = identifier.split_once('_') {
                if self.is_known(first) {
                    identifier = identifier.replace('_', ".");
                }
            }
        }

        // bounded: each alias can be substituted at most once
        for _ in 0..self.aliases.len() {
            let Some((first, rest)) = identifier.split_once('.') else {
                break;
            };
            match self.aliases.get(first) {
                Some(path) => identifier = format!("{}.{}", path, rest),
                None => break,
            }
        }

        identifier
    }
}

/// Resolve `identifier` against `row`.
///
/// Returns the leaf value, an array when the path crosses a list of records,
/// or `Value::Null` when nothing is found. Never fails.
pub fn resolve(identifier: &str, row: &RowData, aliases: Option<&AliasMap>) -> Value {
    match aliases {
        Some(aliases) => resolve_path(&aliases.normalize(identifier), row),
        None => resolve_path(identifier, row),
    }
}

fn resolve_path(identifier: &str, row: &RowData) -> Value {
    let next = identifier
        .split_once('.')
        .map(|(_, rest)| rest)
        .unwrap_or(identifier);

    match row {
        RowData::Record(fields) => {
            if let Some((head, _)) = next.split_once('.') {
                if let Some(nested) = fields.get(head).filter(|n| !n.is_null()) {
                    return resolve_path(next, nested);
                }
            }

            if let Some(found) = fields.get(next).filter(|v| !v.is_null()) {
                return found.to_value();
            }

            // snake_case field names split by the underscore rewrite
            let snake = next.replace('.', "_");
            if snake != next {
                if let Some(found) = fields.get(&snake).filter(|v| !v.is_null()) {
                    return found.to_value();
                }
            }

            Value::Null
        }
        RowData::List(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_path(identifier, item))
                .filter(|v| !v.is_null())
                .collect(),
        ),
        RowData::Scalar(_) => Value::Null,
    }
}
