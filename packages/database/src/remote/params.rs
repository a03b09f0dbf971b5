//! Rendering of statements into PostgREST query-string parameters.

use chrono::NaiveDateTime;

use crate::{
    DatabaseValue,
    query::{BooleanExpression, ExpressionType, SelectQuery, Sort, SortDirection},
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn render_value(value: &DatabaseValue, now: NaiveDateTime) -> String {
    match value {
        DatabaseValue::Null => "null".to_string(),
        DatabaseValue::String(value) => value.clone(),
        DatabaseValue::Bool(value) => value.to_string(),
        DatabaseValue::Number(value) => value.to_string(),
        DatabaseValue::UNumber(value) => value.to_string(),
        DatabaseValue::Real(value) => value.to_string(),
        DatabaseValue::DateTime(value) => value.format(TIMESTAMP_FORMAT).to_string(),
        DatabaseValue::Now => now.format(TIMESTAMP_FORMAT).to_string(),
    }
}

/// Strings inside `in.(...)` lists are always quoted so that commas,
/// parentheses and reserved words survive.
fn render_list_value(value: &DatabaseValue, now: NaiveDateTime) -> String {
    match value {
        DatabaseValue::String(value) => {
            format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
        }
        value => render_value(value, now),
    }
}

fn operator(op: &str, value: &DatabaseValue, now: NaiveDateTime) -> String {
    format!("{op}.{}", render_value(value, now))
}

/// Renders a single filter as a `(column, "<op>.<value>")` pair
#[must_use]
pub fn filter_param(filter: &dyn BooleanExpression, now: NaiveDateTime) -> Option<(String, String)> {
    let (column, value) = match filter.expression_type() {
        ExpressionType::Eq(x) if x.right.is_null() => (&x.left, "is.null".to_string()),
        ExpressionType::Eq(x) => (&x.left, operator("eq", &x.right, now)),
        ExpressionType::NotEq(x) if x.right.is_null() => (&x.left, "not.is.null".to_string()),
        ExpressionType::NotEq(x) => (&x.left, operator("neq", &x.right, now)),
        ExpressionType::Gt(x) => (&x.left, operator("gt", &x.right, now)),
        ExpressionType::Gte(x) => (&x.left, operator("gte", &x.right, now)),
        ExpressionType::Lt(x) => (&x.left, operator("lt", &x.right, now)),
        ExpressionType::Lte(x) => (&x.left, operator("lte", &x.right, now)),
        ExpressionType::In(x) => {
            let values = x
                .values
                .iter()
                .map(|value| render_list_value(value, now))
                .collect::<Vec<_>>()
                .join(",");
            (&x.left, format!("in.({values})"))
        }
        ExpressionType::Sort(_)
        | ExpressionType::Identifier(_)
        | ExpressionType::DatabaseValue(_) => {
            log::warn!("Ignoring non-boolean filter expression: {filter:?}");
            return None;
        }
    };

    Some((column.value.clone(), value))
}

#[must_use]
pub fn filter_params(
    filters: &[Box<dyn BooleanExpression>],
    now: NaiveDateTime,
) -> Vec<(String, String)> {
    filters
        .iter()
        .filter_map(|filter| filter_param(filter.as_ref(), now))
        .collect()
}

/// Nulls sort last in both directions.
#[must_use]
pub fn order_param(sorts: &[Sort]) -> Option<(String, String)> {
    if sorts.is_empty() {
        return None;
    }

    let order = sorts
        .iter()
        .map(|sort| {
            let direction = match sort.direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            format!("{}.{direction}.nullslast", sort.expression.value)
        })
        .collect::<Vec<_>>()
        .join(",");

    Some(("order".to_string(), order))
}

#[must_use]
pub fn select_params(query: &SelectQuery<'_>, now: NaiveDateTime) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.columns.join(","))];

    params.extend(filter_params(&query.filters, now));
    params.extend(order_param(&query.sorts));

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }

    params
}

/// The union of the records' columns in first-seen order, sent as `columns`
/// so that records with different key sets can share one bulk insert.
#[must_use]
pub fn insert_params(records: &[Vec<(&str, DatabaseValue)>]) -> Vec<(String, String)> {
    let mut columns: Vec<&str> = vec![];
    for &(name, _) in records.iter().flatten() {
        if !columns.contains(&name) {
            columns.push(name);
        }
    }

    if columns.is_empty() {
        return vec![];
    }

    vec![("columns".to_string(), columns.join(","))]
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::query::{
        FilterableQuery as _, insert, select, where_eq, where_gt, where_gte, where_in, where_lt,
        where_lte, where_not_eq,
    };

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
    }

    fn param(filter: &dyn BooleanExpression) -> (String, String) {
        filter_param(filter, now()).unwrap()
    }

    fn pair(column: &str, value: &str) -> (String, String) {
        (column.to_string(), value.to_string())
    }

    #[test_log::test]
    fn renders_comparison_operators() {
        assert_eq!(param(&where_eq("username", "b")), pair("username", "eq.b"));
        assert_eq!(param(&where_not_eq("role", "admin")), pair("role", "neq.admin"));
        assert_eq!(param(&where_gt("id", 3)), pair("id", "gt.3"));
        assert_eq!(param(&where_gte("id", 3_u64)), pair("id", "gte.3"));
        assert_eq!(param(&where_lt("grade", 2.5)), pair("grade", "lt.2.5"));
        assert_eq!(param(&where_lte("active", true)), pair("active", "lte.true"));
    }

    #[test_log::test]
    fn renders_null_equality_as_is_null() {
        assert_eq!(
            param(&where_eq("role", DatabaseValue::Null)),
            pair("role", "is.null")
        );
        assert_eq!(
            param(&where_not_eq("role", DatabaseValue::Null)),
            pair("role", "not.is.null")
        );
    }

    #[test_log::test]
    fn renders_in_lists_with_quoted_strings() {
        assert_eq!(param(&where_in("id", [1, 2, 3])), pair("id", "in.(1,2,3)"));
        assert_eq!(
            param(&where_in("username", ["a,b", "say \"hi\""])),
            pair("username", r#"in.("a,b","say \"hi\"")"#)
        );
    }

    #[test_log::test]
    fn renders_timestamps_and_now() {
        assert_eq!(
            param(&where_gte("join_date", DatabaseValue::Now)),
            pair("join_date", "gte.2024-01-02T03:04:05")
        );
    }

    #[test_log::test]
    fn renders_full_select() {
        let query = select("users")
            .columns(&["id", "username"])
            .where_eq("role", "student")
            .sort("grade", SortDirection::Desc)
            .sort("id", SortDirection::Asc)
            .limit(10);

        assert_eq!(
            select_params(&query, now()),
            vec![
                pair("select", "id,username"),
                pair("role", "eq.student"),
                pair("order", "grade.desc.nullslast,id.asc.nullslast"),
                pair("limit", "10"),
            ]
        );
    }

    #[test_log::test]
    fn default_select_requests_every_column() {
        assert_eq!(
            select_params(&select("users"), now()),
            vec![pair("select", "*")]
        );
    }

    #[test_log::test]
    fn insert_params_list_the_union_of_record_columns() {
        let statement = insert("users")
            .record(vec![("username", DatabaseValue::from("a"))])
            .record(vec![
                ("username", DatabaseValue::from("b")),
                ("role", DatabaseValue::from("x")),
            ])
            .record(vec![("grade", DatabaseValue::from(3))]);

        assert_eq!(
            insert_params(&statement.records),
            vec![pair("columns", "username,role,grade")]
        );
    }

    #[test_log::test]
    fn insert_params_are_empty_without_columns() {
        assert!(insert_params(&insert("users").records).is_empty());
    }
}
