use std::cmp::Ordering;

use chrono::NaiveDateTime;

use crate::{
    DatabaseValue, Row,
    models::parse_timestamp,
    query::{BooleanExpression, ExpressionType, Identifier, Sort, SortDirection},
};

fn column<'a>(row: &'a Row, identifier: &Identifier) -> &'a DatabaseValue {
    row.get_ref(&identifier.value).unwrap_or(&DatabaseValue::Null)
}

fn cast_text(column: &DatabaseValue, text: &str) -> Option<DatabaseValue> {
    match column {
        DatabaseValue::Number(_) | DatabaseValue::UNumber(_) => text
            .parse::<i64>()
            .map(DatabaseValue::Number)
            .ok()
            .or_else(|| text.parse::<u64>().ok().map(DatabaseValue::UNumber))
            .or_else(|| text.parse::<f64>().ok().map(DatabaseValue::Real)),
        DatabaseValue::Real(_) => text.parse::<f64>().ok().map(DatabaseValue::Real),
        DatabaseValue::DateTime(_) => parse_timestamp(text).map(DatabaseValue::DateTime),
        DatabaseValue::Bool(_) => match text.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(DatabaseValue::Bool(true)),
            "false" | "f" | "0" => Some(DatabaseValue::Bool(false)),
            _ => None,
        },
        DatabaseValue::Null | DatabaseValue::String(_) | DatabaseValue::Now => None,
    }
}

/// Resolves `Now` and casts a textual operand to the type of the column it
/// is compared against. Text that does not parse stays text and compares as
/// incomparable.
fn operand(column: &DatabaseValue, value: &DatabaseValue, now: NaiveDateTime) -> DatabaseValue {
    let value = value.clone().resolve(now);
    let cast = value
        .as_str()
        .and_then(|text| cast_text(column, text.trim()));
    cast.unwrap_or(value)
}

fn compare(
    row: &Row,
    identifier: &Identifier,
    value: &DatabaseValue,
    now: NaiveDateTime,
) -> Option<Ordering> {
    let current = column(row, identifier);
    current.compare(&operand(current, value, now))
}

/// Evaluates a filter against a row. Missing columns read as `Null`, and a
/// comparison against `Null` is false except for `Eq`/`NotEq` with a `Null`
/// right-hand side, which test for absence/presence. `now` stands in for
/// every `Now` operand.
pub fn matches(row: &Row, filter: &dyn BooleanExpression, now: NaiveDateTime) -> bool {
    match filter.expression_type() {
        ExpressionType::Eq(x) => {
            if x.right.is_null() {
                column(row, &x.left).is_null()
            } else {
                compare(row, &x.left, &x.right, now) == Some(Ordering::Equal)
            }
        }
        ExpressionType::NotEq(x) => {
            if x.right.is_null() {
                !column(row, &x.left).is_null()
            } else {
                matches!(
                    compare(row, &x.left, &x.right, now),
                    Some(Ordering::Less | Ordering::Greater)
                )
            }
        }
        ExpressionType::Gt(x) => compare(row, &x.left, &x.right, now) == Some(Ordering::Greater),
        ExpressionType::Gte(x) => matches!(
            compare(row, &x.left, &x.right, now),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        ExpressionType::Lt(x) => compare(row, &x.left, &x.right, now) == Some(Ordering::Less),
        ExpressionType::Lte(x) => matches!(
            compare(row, &x.left, &x.right, now),
            Some(Ordering::Less | Ordering::Equal)
        ),
        ExpressionType::In(x) => {
            let value = column(row, &x.left);
            x.values
                .iter()
                .any(|candidate| value.loosely_eq(&operand(value, candidate, now)))
        }
        ExpressionType::Sort(_)
        | ExpressionType::Identifier(_)
        | ExpressionType::DatabaseValue(_) => {
            log::warn!("Ignoring non-boolean filter expression: {filter:?}");
            true
        }
    }
}

pub fn matches_all(
    row: &Row,
    filters: &[Box<dyn BooleanExpression>],
    now: NaiveDateTime,
) -> bool {
    filters
        .iter()
        .all(|filter| matches(row, filter.as_ref(), now))
}

/// Stable multi-column sort. Nulls and incomparable values go last.
pub fn sort_rows(rows: &mut [Row], sorts: &[Sort]) {
    if sorts.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for sort in sorts {
            let left = column(a, &sort.expression);
            let right = column(b, &sort.expression);

            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
            };

            let ordering = match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });
}
