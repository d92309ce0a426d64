//! Grid request translation.
//!
//! [`translate`] maps a grid's filter, paging and sort parameters onto any query
//! implementing [`GridQuery`]. It works on a clone, so a failed translation leaves
//! the caller's query untouched.
//!
//! Filters are applied first, then pagination, then sort.

use crate::builder::{escape_like, ComparisonOp, Condition, LogicalOp, Operand, OrderBy};
use crate::column::{Column, ColumnFormat, SearchType};
use crate::config::GridConfig;
use crate::error::Result;
use crate::filter::{FilterOperator, FilterRule};
use crate::grid::Grid;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

/// Query capabilities the translator needs.
pub trait GridQuery: Clone {
    /// AND a condition into the WHERE or HAVING group.
    fn apply_filter(&mut self, condition: Condition, search_type: SearchType);

    /// Remove and return the current ordering.
    fn take_order_by(&mut self) -> Vec<OrderBy>;

    fn push_order_by(&mut self, order: OrderBy);

    fn set_page(&mut self, limit: usize, offset: usize);
}

/// Translate `grid` onto a copy of `query`.
pub fn translate<Q: GridQuery>(query: &Q, grid: &Grid) -> Result<Q> {
    let mut translated = query.clone();
    apply_filters(&mut translated, grid)?;
    apply_pagination(&mut translated, grid.page(), grid.page_size());
    apply_sort(&mut translated, grid);
    Ok(translated)
}

/// WHERE and HAVING conditions built from the grid filter.
pub fn filter_conditions(grid: &Grid) -> Result<(Option<Condition>, Option<Condition>)> {
    let filter = grid.filter();

    // every operator is validated, even on columns that end up skipped
    for rule in filter.rules.values().flatten() {
        rule.parsed_operator()?;
    }

    let mut where_group = Vec::new();
    let mut having_group = Vec::new();

    for column in grid.columns() {
        let attributes = column.attributes();
        if !attributes.is_searchable || attributes.is_hidden {
            continue;
        }

        let mut rule_conditions = Vec::new();
        for rule in filter.rules_for(column.name()) {
            if let Some(condition) = rule_condition(column, rule, grid.config())? {
                rule_conditions.push(condition);
            }
        }
        if rule_conditions.is_empty() {
            continue;
        }

        let condition = Condition::combine(rule_conditions, filter.operator);
        match attributes.search_type {
            SearchType::Where => where_group.push(condition),
            SearchType::Having => having_group.push(condition),
        }
    }

    let group = |conditions: Vec<Condition>| {
        (!conditions.is_empty()).then(|| Condition::combine(conditions, filter.operator))
    };
    Ok((group(where_group), group(having_group)))
}

fn apply_filters<Q: GridQuery>(query: &mut Q, grid: &Grid) -> Result<()> {
    let (where_condition, having_condition) = filter_conditions(grid)?;
    if let Some(condition) = where_condition {
        query.apply_filter(condition, SearchType::Where);
    }
    if let Some(condition) = having_condition {
        query.apply_filter(condition, SearchType::Having);
    }
    Ok(())
}

/// Limit/offset for a 1-based page; a page size of 0 leaves the query unpaged.
///
/// Both values saturate at `i64::MAX`, the largest LIMIT/OFFSET SQL backends accept.
pub fn apply_pagination<Q: GridQuery>(query: &mut Q, page: usize, page_size: usize) {
    if page_size > 0 {
        let limit = page_size.min(i64::MAX as usize);
        let offset = limit.saturating_mul(page.saturating_sub(1)).min(i64::MAX as usize);
        query.set_page(limit, offset);
    }
}

fn apply_sort<Q: GridQuery>(query: &mut Q, grid: &Grid) {
    let defaults = query.take_order_by();

    for (name, direction) in grid.sort() {
        let Some(column) = grid.column_by_name(name) else {
            debug!(column = %name, "Skipping sort on unknown column");
            continue;
        };
        let attributes = column.attributes();
        if !attributes.is_sortable || attributes.is_hidden {
            debug!(column = %name, "Skipping sort on hidden or non-sortable column");
            continue;
        }
        for order in column.sort_keys(*direction) {
            query.push_order_by(order);
        }
    }

    for order in defaults {
        query.push_order_by(order);
    }
}

/// Condition for one rule, or `None` when a word search has no words.
fn rule_condition(column: &Column, rule: &FilterRule, config: &GridConfig) -> Result<Option<Condition>> {
    let operator = rule.parsed_operator()?;

    if operator.splits_words() {
        let words = rule.words();
        if words.is_empty() {
            return Ok(None);
        }

        let operand = column.search_operand();
        let is_date = column.attributes().format == Some(ColumnFormat::Date);
        let conditions = words
            .into_iter()
            .map(|word| {
                let word = if is_date {
                    convert_input_date(&word, &config.date_input_formats)
                } else {
                    word
                };
                comparison(&operand, operator, Value::String(word))
            })
            .collect();

        let combinator = if column.attributes().search_group_operator == LogicalOp::And {
            LogicalOp::And
        } else if operator == FilterOperator::Contains {
            LogicalOp::Or
        } else {
            LogicalOp::And
        };
        return Ok(Some(Condition::combine(conditions, combinator)));
    }

    let value = comparison_value(column, rule, operator, config);
    let conditions = column
        .filter_targets()
        .iter()
        .map(|operand| comparison(operand, operator, value.clone()))
        .collect();
    Ok(Some(Condition::combine(conditions, LogicalOp::Or)))
}

fn comparison_value(column: &Column, rule: &FilterRule, operator: FilterOperator, config: &GridConfig) -> Value {
    if matches!(operator, FilterOperator::In | FilterOperator::NotIn) {
        return Value::Array(rule.value_list().into_iter().map(Value::String).collect());
    }

    if column.attributes().format == Some(ColumnFormat::Date) {
        return Value::String(convert_input_date(&rule.value_text(), &config.date_input_formats));
    }

    match &rule.value {
        Value::Number(_) | Value::Bool(_) => rule.value.clone(),
        _ => {
            let text = rule.value_text();
            let numeric = operator.is_ordering() || column.attributes().search_type == SearchType::Having;
            if numeric {
                if let Some(number) = numeric_literal(&text) {
                    return number;
                }
            }
            Value::String(text)
        }
    }
}

/// `"100"` as a JSON number, so ordering compares numerically in SQL.
fn numeric_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .filter(|float| float.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Convert a locale date such as `31.12.2024` to `2024-12-31`; other input is kept.
pub fn convert_input_date(input: &str, formats: &[String]) -> String {
    let input = input.trim();
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| input.to_string())
}

/// Primitive comparison of one operand against a value.
fn comparison(operand: &Operand, operator: FilterOperator, value: Value) -> Condition {
    let simple = |op: ComparisonOp, value: Value| Condition::Simple {
        column: operand.clone(),
        op,
        value: Some(value),
    };

    let condition = match operator {
        FilterOperator::Equal => simple(ComparisonOp::Eq, value),
        FilterOperator::NotEqual => simple(ComparisonOp::Ne, value),
        FilterOperator::Less => simple(ComparisonOp::Lt, value),
        FilterOperator::LessOrEqual => simple(ComparisonOp::Le, value),
        FilterOperator::Greater => simple(ComparisonOp::Gt, value),
        FilterOperator::GreaterOrEqual => simple(ComparisonOp::Ge, value),
        FilterOperator::BeginsWith => simple(ComparisonOp::Like, like_pattern(&value, "", "%")),
        FilterOperator::NotBeginsWith => simple(ComparisonOp::NotLike, like_pattern(&value, "", "%")),
        FilterOperator::EndsWith => simple(ComparisonOp::Like, like_pattern(&value, "%", "")),
        FilterOperator::NotEndsWith => simple(ComparisonOp::NotLike, like_pattern(&value, "%", "")),
        FilterOperator::Contains => simple(ComparisonOp::Like, like_pattern(&value, "%", "%")),
        FilterOperator::NotContains => simple(ComparisonOp::NotLike, like_pattern(&value, "%", "%")),
        FilterOperator::In => simple(ComparisonOp::In, value),
        FilterOperator::NotIn => simple(ComparisonOp::NotIn, value),
    };

    if operator.is_negated() {
        Condition::Compound {
            conditions: vec![condition, Condition::is_null(operand.clone())],
            op: LogicalOp::Or,
        }
    } else {
        condition
    }
}

fn like_pattern(value: &Value, prefix: &str, suffix: &str) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Value::String(format!("{}{}{}", prefix, escape_like(&text), suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{SelectBuilder, SortDirection};
    use crate::filter::Filter;
    use crate::grid::GridParams;

    fn users_grid(filter: Filter) -> Grid {
        Grid::new("users")
            .column(Column::text("name", "u.name"))
            .column(Column::text("age", "u.age"))
            .column(Column::text("secret", "u.secret").hidden(true))
            .column(Column::text("note", "u.note").sortable(false).searchable(false))
            .column(Column::concat("full_name", vec!["u.first_name", "u.last_name"], " "))
            .with_params(GridParams {
                filter,
                page_size: Some(0),
                ..GridParams::default()
            })
    }

    fn sql(grid: &Grid) -> String {
        let query = SelectBuilder::new("users").alias("u");
        translate(&query, grid).unwrap().build().unwrap()
    }

    #[test]
    fn test_contains_words_or() {
        let grid = users_grid(Filter::new(LogicalOp::And).rule("name", FilterOperator::Contains, "jo  ann jo"));
        assert_eq!(
            sql(&grid),
            "SELECT * FROM users u WHERE (u.name LIKE '%jo%' ESCAPE '\\' OR u.name LIKE '%ann%' ESCAPE '\\')"
        );
    }

    #[test]
    fn test_not_contains_words_and() {
        let grid = users_grid(Filter::new(LogicalOp::And).rule("name", FilterOperator::NotContains, "jo ann"));
        assert_eq!(
            sql(&grid),
            "SELECT * FROM users u WHERE ((u.name NOT LIKE '%jo%' ESCAPE '\\' OR u.name IS NULL) AND (u.name NOT LIKE '%ann%' ESCAPE '\\' OR u.name IS NULL))"
        );
    }

    #[test]
    fn test_search_group_and_forces_and() {
        let grid = Grid::new("users")
            .column(Column::text("name", "name").search_group(LogicalOp::And))
            .with_params(GridParams {
                filter: Filter::new(LogicalOp::Or).rule("name", FilterOperator::Contains, "a b"),
                ..GridParams::default()
            });
        let query = translate(&SelectBuilder::new("users"), &grid).unwrap();
        assert_eq!(
            query.where_condition().unwrap().to_sql(),
            "(name LIKE '%a%' ESCAPE '\\' AND name LIKE '%b%' ESCAPE '\\')"
        );
    }

    #[test]
    fn test_empty_words_rule_is_skipped() {
        let grid = users_grid(Filter::new(LogicalOp::And).rule("name", FilterOperator::Contains, "   "));
        assert_eq!(sql(&grid), "SELECT * FROM users u");
    }

    #[test]
    fn test_primitive_operators() {
        let cases = [
            (FilterOperator::Equal, "u.name = 'x'"),
            (FilterOperator::NotEqual, "(u.name <> 'x' OR u.name IS NULL)"),
            (FilterOperator::Less, "u.name < 'x'"),
            (FilterOperator::GreaterOrEqual, "u.name >= 'x'"),
            (FilterOperator::BeginsWith, "u.name LIKE 'x%' ESCAPE '\\'"),
            (FilterOperator::NotEndsWith, "(u.name NOT LIKE '%x' ESCAPE '\\' OR u.name IS NULL)"),
            (FilterOperator::In, "u.name IN ('x')"),
            (FilterOperator::NotIn, "(u.name NOT IN ('x') OR u.name IS NULL)"),
        ];
        for (operator, expected) in cases {
            let grid = users_grid(Filter::new(LogicalOp::And).rule("name", operator, "x"));
            let query = translate(&SelectBuilder::new("users").alias("u"), &grid).unwrap();
            assert_eq!(query.where_condition().unwrap().to_sql(), expected, "operator {}", operator);
        }
    }

    #[test]
    fn test_in_splits_on_comma() {
        let grid = users_grid(Filter::new(LogicalOp::And).rule("age", FilterOperator::In, "18,21, 30"));
        let query = translate(&SelectBuilder::new("users").alias("u"), &grid).unwrap();
        assert_eq!(
            query.where_condition().unwrap().to_sql(),
            "u.age IN ('18', '21', '30')"
        );
    }

    #[test]
    fn test_like_value_is_escaped() {
        let grid = users_grid(Filter::new(LogicalOp::And).rule("name", FilterOperator::BeginsWith, "50%_"));
        let query = translate(&SelectBuilder::new("users").alias("u"), &grid).unwrap();
        assert_eq!(
            query.where_condition().unwrap().to_sql(),
            "u.name LIKE '50\\%\\_%' ESCAPE '\\'"
        );
    }

    #[test]
    fn test_concat_columns() {
        let grid = users_grid(
            Filter::new(LogicalOp::And)
                .rule("full_name", FilterOperator::Contains, "jo")
                .rule("full_name", FilterOperator::Equal, "Jo"),
        );
        let query = translate(&SelectBuilder::new("users").alias("u"), &grid).unwrap();
        assert_eq!(
            query.where_condition().unwrap().to_sql(),
            "((COALESCE(CAST(u.first_name AS TEXT), '') || COALESCE(CAST(u.last_name AS TEXT), '')) LIKE '%jo%' ESCAPE '\\' AND (u.first_name = 'Jo' OR u.last_name = 'Jo'))"
        );
    }

    #[test]
    fn test_rules_and_columns_use_grid_combinator() {
        let grid = users_grid(
            Filter::new(LogicalOp::Or)
                .rule("name", FilterOperator::Equal, "a")
                .rule("age", FilterOperator::Greater, 30),
        );
        let query = translate(&SelectBuilder::new("users").alias("u"), &grid).unwrap();
        assert_eq!(
            query.where_condition().unwrap().to_sql(),
            "(u.name = 'a' OR u.age > 30)"
        );
    }

    #[test]
    fn test_hidden_and_unsearchable_columns_are_not_filtered() {
        let grid = users_grid(
            Filter::new(LogicalOp::And)
                .rule("secret", FilterOperator::Equal, "a")
                .rule("note", FilterOperator::Equal, "b")
                .rule("unknown", FilterOperator::Equal, "c"),
        );
        assert_eq!(sql(&grid), "SELECT * FROM users u");
    }

    #[test]
    fn test_having_columns() {
        let grid = Grid::new("orders")
            .column(Column::text("total", "SUM(o.amount)").search_type(SearchType::Having))
            .column(Column::text("state", "o.state"))
            .with_params(GridParams {
                filter: Filter::new(LogicalOp::And)
                    .rule("total", FilterOperator::Greater, 100)
                    .rule("state", FilterOperator::Equal, "paid"),
                ..GridParams::default()
            });
        let query = SelectBuilder::new("orders").alias("o").group_by(vec!["o.state"]);
        let query = translate(&query, &grid).unwrap();

        assert_eq!(query.where_condition().unwrap().to_sql(), "o.state = 'paid'");
        assert_eq!(query.having_condition().unwrap().to_sql(), "SUM(o.amount) > 100");
    }

    #[test]
    fn test_date_format_conversion() {
        let grid = Grid::new("orders")
            .column(Column::text("created", "o.created_at").format(ColumnFormat::Date))
            .with_params(GridParams {
                filter: Filter::new(LogicalOp::And).rule("created", FilterOperator::GreaterOrEqual, "02.03.2024"),
                ..GridParams::default()
            });
        let query = translate(&SelectBuilder::new("orders").alias("o"), &grid).unwrap();
        assert_eq!(query.where_condition().unwrap().to_sql(), "o.created_at >= '2024-03-02'");
    }

    #[test]
    fn test_date_words_are_converted() {
        let grid = Grid::new("orders")
            .column(Column::text("created", "o.created_at").format(ColumnFormat::Date))
            .with_params(GridParams {
                filter: Filter::new(LogicalOp::And).rule("created", FilterOperator::Contains, "07.03.2024 2024"),
                ..GridParams::default()
            });
        let query = translate(&SelectBuilder::new("orders").alias("o"), &grid).unwrap();
        assert_eq!(
            query.where_condition().unwrap().to_sql(),
            "(o.created_at LIKE '%2024-03-07%' ESCAPE '\\' OR o.created_at LIKE '%2024%' ESCAPE '\\')"
        );
    }

    #[test]
    fn test_numeric_text_compares_as_number() {
        let cases = [
            (FilterOperator::Greater, "100", "u.age > 100"),
            (FilterOperator::LessOrEqual, " 2.5 ", "u.age <= 2.5"),
            (FilterOperator::Less, "abc", "u.age < 'abc'"),
            (FilterOperator::Equal, "100", "u.age = '100'"),
        ];
        for (operator, value, expected) in cases {
            let grid = users_grid(Filter::new(LogicalOp::And).rule("age", operator, value));
            let query = translate(&SelectBuilder::new("users").alias("u"), &grid).unwrap();
            assert_eq!(query.where_condition().unwrap().to_sql(), expected, "operator {}", operator);
        }
    }

    #[test]
    fn test_having_text_value_compares_as_number() {
        let grid = Grid::new("orders")
            .column(Column::text("total", "SUM(o.amount)").search_type(SearchType::Having))
            .with_params(GridParams {
                filter: Filter::new(LogicalOp::And)
                    .rule("total", FilterOperator::Greater, "100")
                    .rule("total", FilterOperator::Equal, "250"),
                ..GridParams::default()
            });
        let query = SelectBuilder::new("orders").alias("o").group_by(vec!["o.state"]);
        let query = translate(&query, &grid).unwrap();
        assert_eq!(
            query.having_condition().unwrap().to_sql(),
            "(SUM(o.amount) > 100 AND SUM(o.amount) = 250)"
        );
    }

    #[test]
    fn test_convert_input_date() {
        let formats = GridConfig::default().date_input_formats;
        assert_eq!(convert_input_date("31/12/2024", &formats), "2024-12-31");
        assert_eq!(convert_input_date("2024-12-31", &formats), "2024-12-31");
        assert_eq!(convert_input_date("soon", &formats), "soon");
    }

    #[test]
    fn test_invalid_operator_leaves_query_untouched() {
        let mut filter = Filter::new(LogicalOp::And);
        filter.rules.insert(
            "name".into(),
            vec![FilterRule {
                operator: "=~".into(),
                value: Value::String("x".into()),
            }],
        );
        let grid = users_grid(filter);
        let query = SelectBuilder::new("users").alias("u").order_asc("u.id");

        assert!(translate(&query, &grid).is_err());
        assert!(translate(&query, &grid).is_err());
        assert_eq!(query.build().unwrap(), "SELECT * FROM users u ORDER BY u.id ASC");
    }

    #[test]
    fn test_pagination_boundaries() {
        let query = SelectBuilder::new("users");

        let mut first = query.clone();
        apply_pagination(&mut first, 1, 10);
        assert_eq!(first.page(), (Some(10), Some(0)));

        let mut third = query.clone();
        apply_pagination(&mut third, 3, 10);
        assert_eq!(third.page(), (Some(10), Some(20)));

        let mut zero = query.clone();
        apply_pagination(&mut zero, 0, 10);
        assert_eq!(zero.page(), (Some(10), Some(0)));

        let mut unpaged = query.clone();
        apply_pagination(&mut unpaged, 4, 0);
        assert_eq!(unpaged.page(), (None, None));

        let mut huge = query.clone();
        apply_pagination(&mut huge, usize::MAX, 10);
        assert_eq!(huge.page(), (Some(10), Some(i64::MAX as usize)));

        let mut huge_size = query;
        apply_pagination(&mut huge_size, 3, usize::MAX);
        assert_eq!(huge_size.page(), (Some(i64::MAX as usize), Some(i64::MAX as usize)));
    }

    #[test]
    fn test_sort_keeps_defaults_as_tiebreaker() {
        let grid = users_grid(Filter::default()).with_params(GridParams {
            sort: vec![
                ("secret".into(), SortDirection::Desc),
                ("full_name".into(), SortDirection::Desc),
                ("note".into(), SortDirection::Asc),
                ("missing".into(), SortDirection::Asc),
                ("name".into(), SortDirection::Desc),
            ],
            page_size: Some(0),
            ..GridParams::default()
        });
        let query = SelectBuilder::new("users").alias("u").order_asc("u.id");
        let query = translate(&query, &grid).unwrap();

        assert_eq!(
            query.ordering(),
            &[
                OrderBy::new("u.first_name", SortDirection::Desc),
                OrderBy::new("u.last_name", SortDirection::Asc),
                OrderBy::new("u.name", SortDirection::Desc),
                OrderBy::new("u.id", SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn test_translate_order_filters_page_sort() {
        let grid = Grid::new("users")
            .column(Column::text("name", "u.name"))
            .with_params(GridParams {
                page: 2,
                page_size: Some(5),
                sort: vec![("name".into(), SortDirection::Asc)],
                filter: Filter::new(LogicalOp::And).rule("name", FilterOperator::BeginsWith, "A"),
            });
        assert_eq!(
            sql(&grid),
            "SELECT * FROM users u WHERE u.name LIKE 'A%' ESCAPE '\\' ORDER BY u.name ASC LIMIT 5 OFFSET 5"
        );
    }
}
