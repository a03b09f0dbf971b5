use std::fmt::Debug;

use crate::{Database, DatabaseValue, Response, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug)]
pub struct Sort {
    pub expression: Identifier,
    pub direction: SortDirection,
}

impl Expression for Sort {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::Sort(self)
    }
}

pub enum ExpressionType<'a> {
    Eq(&'a Eq),
    Gt(&'a Gt),
    In(&'a In),
    Lt(&'a Lt),
    Gte(&'a Gte),
    Lte(&'a Lte),
    Sort(&'a Sort),
    NotEq(&'a NotEq),
    Identifier(&'a Identifier),
    DatabaseValue(&'a DatabaseValue),
}

pub trait Expression: Send + Sync + Debug {
    fn expression_type(&self) -> ExpressionType<'_>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub value: String,
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self { value }
    }
}

impl Expression for Identifier {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::Identifier(self)
    }
}

#[must_use]
pub fn identifier(value: &str) -> Identifier {
    value.into()
}

impl Expression for DatabaseValue {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::DatabaseValue(self)
    }
}

/// Marker for expressions that can be used as a row filter
pub trait BooleanExpression: Expression {}

#[derive(Debug)]
pub struct Eq {
    pub(crate) left: Identifier,
    pub(crate) right: DatabaseValue,
}

impl BooleanExpression for Eq {}
impl Expression for Eq {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::Eq(self)
    }
}

#[derive(Debug)]
pub struct NotEq {
    pub(crate) left: Identifier,
    pub(crate) right: DatabaseValue,
}

impl BooleanExpression for NotEq {}
impl Expression for NotEq {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::NotEq(self)
    }
}

#[derive(Debug)]
pub struct Gt {
    pub(crate) left: Identifier,
    pub(crate) right: DatabaseValue,
}

impl BooleanExpression for Gt {}
impl Expression for Gt {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::Gt(self)
    }
}

#[derive(Debug)]
pub struct Gte {
    pub(crate) left: Identifier,
    pub(crate) right: DatabaseValue,
}

impl BooleanExpression for Gte {}
impl Expression for Gte {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::Gte(self)
    }
}

#[derive(Debug)]
pub struct Lt {
    pub(crate) left: Identifier,
    pub(crate) right: DatabaseValue,
}

impl BooleanExpression for Lt {}
impl Expression for Lt {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::Lt(self)
    }
}

#[derive(Debug)]
pub struct Lte {
    pub(crate) left: Identifier,
    pub(crate) right: DatabaseValue,
}

impl BooleanExpression for Lte {}
impl Expression for Lte {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::Lte(self)
    }
}

#[derive(Debug)]
pub struct In {
    pub(crate) left: Identifier,
    pub(crate) values: Vec<DatabaseValue>,
}

impl BooleanExpression for In {}
impl Expression for In {
    fn expression_type(&self) -> ExpressionType<'_> {
        ExpressionType::In(self)
    }
}

pub fn sort<T>(expression: T, direction: SortDirection) -> Sort
where
    T: Into<Identifier>,
{
    Sort {
        expression: expression.into(),
        direction,
    }
}

pub fn where_eq<L, R>(left: L, right: R) -> Eq
where
    L: Into<Identifier>,
    R: Into<DatabaseValue>,
{
    Eq {
        left: left.into(),
        right: right.into(),
    }
}

pub fn where_not_eq<L, R>(left: L, right: R) -> NotEq
where
    L: Into<Identifier>,
    R: Into<DatabaseValue>,
{
    NotEq {
        left: left.into(),
        right: right.into(),
    }
}

pub fn where_gt<L, R>(left: L, right: R) -> Gt
where
    L: Into<Identifier>,
    R: Into<DatabaseValue>,
{
    Gt {
        left: left.into(),
        right: right.into(),
    }
}

pub fn where_gte<L, R>(left: L, right: R) -> Gte
where
    L: Into<Identifier>,
    R: Into<DatabaseValue>,
{
    Gte {
        left: left.into(),
        right: right.into(),
    }
}

pub fn where_lt<L, R>(left: L, right: R) -> Lt
where
    L: Into<Identifier>,
    R: Into<DatabaseValue>,
{
    Lt {
        left: left.into(),
        right: right.into(),
    }
}

pub fn where_lte<L, R>(left: L, right: R) -> Lte
where
    L: Into<Identifier>,
    R: Into<DatabaseValue>,
{
    Lte {
        left: left.into(),
        right: right.into(),
    }
}

pub fn where_in<L, V, T>(left: L, values: V) -> In
where
    L: Into<Identifier>,
    V: IntoIterator<Item = T>,
    T: Into<DatabaseValue>,
{
    In {
        left: left.into(),
        values: values.into_iter().map(Into::into).collect(),
    }
}

pub trait FilterableQuery
where
    Self: Sized,
{
    #[must_use]
    fn filters(self, filters: Vec<Box<dyn BooleanExpression>>) -> Self {
        let mut this = self;
        for filter in filters {
            this = this.filter(filter);
        }
        this
    }

    #[must_use]
    fn filter(self, filter: Box<dyn BooleanExpression>) -> Self;

    #[must_use]
    fn filter_if_some<T: BooleanExpression + 'static>(self, filter: Option<T>) -> Self {
        if let Some(filter) = filter {
            self.filter(Box::new(filter))
        } else {
            self
        }
    }

    #[must_use]
    fn where_in<L, V, T>(self, left: L, values: V) -> Self
    where
        L: Into<Identifier>,
        V: IntoIterator<Item = T>,
        T: Into<DatabaseValue>,
    {
        self.filter(Box::new(where_in(left, values)))
    }

    #[must_use]
    fn where_eq<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Identifier>,
        R: Into<DatabaseValue>,
    {
        self.filter(Box::new(where_eq(left, right)))
    }

    #[must_use]
    fn where_not_eq<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Identifier>,
        R: Into<DatabaseValue>,
    {
        self.filter(Box::new(where_not_eq(left, right)))
    }

    #[must_use]
    fn where_gt<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Identifier>,
        R: Into<DatabaseValue>,
    {
        self.filter(Box::new(where_gt(left, right)))
    }

    #[must_use]
    fn where_gte<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Identifier>,
        R: Into<DatabaseValue>,
    {
        self.filter(Box::new(where_gte(left, right)))
    }

    #[must_use]
    fn where_lt<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Identifier>,
        R: Into<DatabaseValue>,
    {
        self.filter(Box::new(where_lt(left, right)))
    }

    #[must_use]
    fn where_lte<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Identifier>,
        R: Into<DatabaseValue>,
    {
        self.filter(Box::new(where_lte(left, right)))
    }
}

#[derive(Debug)]
pub struct SelectQuery<'a> {
    pub table_name: &'a str,
    pub columns: &'a [&'a str],
    pub filters: Vec<Box<dyn BooleanExpression>>,
    pub sorts: Vec<Sort>,
    pub limit: Option<usize>,
}

#[must_use]
pub const fn select(table_name: &str) -> SelectQuery<'_> {
    SelectQuery {
        table_name,
        columns: &["*"],
        filters: vec![],
        sorts: vec![],
        limit: None,
    }
}

impl FilterableQuery for SelectQuery<'_> {
    fn filter(mut self, filter: Box<dyn BooleanExpression>) -> Self {
        self.filters.push(filter);
        self
    }
}

impl<'a> SelectQuery<'a> {
    #[must_use]
    pub fn columns(mut self, columns: &'a [&'a str]) -> Self {
        self.columns = columns;
        self
    }

    #[must_use]
    pub fn sorts(mut self, sorts: Vec<Sort>) -> Self {
        self.sorts.extend(sorts);
        self
    }

    #[must_use]
    pub fn sort<T>(mut self, expression: T, direction: SortDirection) -> Self
    where
        T: Into<Identifier>,
    {
        self.sorts.push(sort(expression, direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub async fn execute(self, db: &dyn Database) -> Response<Vec<Row>> {
        db.query(&self).await.into()
    }

    /// Resolves to the first matching row, or `None` when nothing matches
    pub async fn execute_first(self, db: &dyn Database) -> Response<Option<Row>> {
        let this = if self.limit.is_none() {
            self.limit(1)
        } else {
            self
        };

        db.query_first(&this).await.into()
    }
}

/// One or more records to insert, in argument order
#[derive(Debug)]
pub struct InsertStatement<'a> {
    pub table_name: &'a str,
    pub records: Vec<Vec<(&'a str, DatabaseValue)>>,
}

#[must_use]
pub const fn insert(table_name: &str) -> InsertStatement<'_> {
    InsertStatement {
        table_name,
        records: vec![],
    }
}

impl<'a> InsertStatement<'a> {
    fn current_record(&mut self) -> &mut Vec<(&'a str, DatabaseValue)> {
        if self.records.is_empty() {
            self.records.push(vec![]);
        }
        let last = self.records.len() - 1;
        &mut self.records[last]
    }

    /// Adds a column to the record currently being built
    #[must_use]
    pub fn value<T: Into<DatabaseValue>>(mut self, name: &'a str, value: T) -> Self {
        self.current_record().push((name, value.into()));
        self
    }

    #[must_use]
    pub fn values<T: Into<DatabaseValue>>(mut self, values: Vec<(&'a str, T)>) -> Self {
        let record = self.current_record();
        for (name, value) in values {
            record.push((name, value.into()));
        }
        self
    }

    /// Starts a new record
    #[must_use]
    pub fn record<T: Into<DatabaseValue>>(mut self, values: Vec<(&'a str, T)>) -> Self {
        self.records.push(
            values
                .into_iter()
                .map(|(name, value)| (name, value.into()))
                .collect(),
        );
        self
    }

    #[must_use]
    pub fn records<T: Into<DatabaseValue>>(mut self, records: Vec<Vec<(&'a str, T)>>) -> Self {
        for record in records {
            self = self.record(record);
        }
        self
    }

    pub async fn execute(&self, db: &dyn Database) -> Response<Vec<Row>> {
        db.exec_insert(self).await.into()
    }

    /// Resolves to the first created row, or `None` if no record was given
    pub async fn execute_first(&self, db: &dyn Database) -> Response<Option<Row>> {
        self.execute(db)
            .await
            .map(|rows| rows.into_iter().next())
    }
}

#[derive(Debug)]
pub struct UpdateStatement<'a> {
    pub table_name: &'a str,
    pub values: Vec<(&'a str, DatabaseValue)>,
    pub filters: Vec<Box<dyn BooleanExpression>>,
    pub limit: Option<usize>,
}

#[must_use]
pub const fn update(table_name: &str) -> UpdateStatement<'_> {
    UpdateStatement {
        table_name,
        values: vec![],
        filters: vec![],
        limit: None,
    }
}

impl FilterableQuery for UpdateStatement<'_> {
    fn filter(mut self, filter: Box<dyn BooleanExpression>) -> Self {
        self.filters.push(filter);
        self
    }
}

impl<'a> UpdateStatement<'a> {
    #[must_use]
    pub fn values<T: Into<DatabaseValue>>(mut self, values: Vec<(&'a str, T)>) -> Self {
        for (name, value) in values {
            self.values.push((name, value.into()));
        }
        self
    }

    #[must_use]
    pub fn value<T: Into<DatabaseValue>>(mut self, name: &'a str, value: T) -> Self {
        self.values.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub async fn execute(&self, db: &dyn Database) -> Response<Vec<Row>> {
        db.exec_update(self).await.into()
    }

    pub async fn execute_first(&self, db: &dyn Database) -> Response<Option<Row>> {
        self.execute(db)
            .await
            .map(|rows| rows.into_iter().next())
    }
}

#[derive(Debug)]
pub struct DeleteStatement<'a> {
    pub table_name: &'a str,
    pub filters: Vec<Box<dyn BooleanExpression>>,
    pub limit: Option<usize>,
}

#[must_use]
pub const fn delete(table_name: &str) -> DeleteStatement<'_> {
    DeleteStatement {
        table_name,
        filters: vec![],
        limit: None,
    }
}

impl FilterableQuery for DeleteStatement<'_> {
    fn filter(mut self, filter: Box<dyn BooleanExpression>) -> Self {
        self.filters.push(filter);
        self
    }
}

impl DeleteStatement<'_> {
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub async fn execute(&self, db: &dyn Database) -> Response<Vec<Row>> {
        db.exec_delete(self).await.into()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn insert_value_builds_a_single_record() {
        let statement = insert("users").value("username", "a").value("role", "admin");

        assert_eq!(
            statement.records,
            vec![vec![
                ("username", DatabaseValue::String("a".into())),
                ("role", DatabaseValue::String("admin".into())),
            ]]
        );
    }

    #[test_log::test]
    fn insert_record_starts_new_records_in_order() {
        let statement = insert("users")
            .record(vec![("username", "a")])
            .record(vec![("username", "b")])
            .value("role", "admin");

        assert_eq!(statement.records.len(), 2);
        assert_eq!(
            statement.records[0],
            vec![("username", DatabaseValue::from("a"))]
        );
        assert_eq!(
            statement.records[1],
            vec![
                ("username", DatabaseValue::from("b")),
                ("role", DatabaseValue::from("admin")),
            ]
        );
    }

    #[test_log::test]
    fn select_collects_filters_sorts_and_limit() {
        let query = select("users")
            .columns(&["id", "username"])
            .where_eq("username", "a")
            .where_gt("id", 3)
            .filter_if_some(None::<Eq>)
            .sort("id", SortDirection::Desc)
            .limit(5);

        assert_eq!(query.columns, &["id", "username"]);
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.sorts.len(), 1);
        assert_eq!(query.limit, Some(5));
    }

    #[test_log::test]
    fn where_in_converts_each_value() {
        let filter = where_in("id", [1_u64, 2, 3]);

        assert_eq!(filter.left, identifier("id"));
        assert_eq!(
            filter.values,
            vec![
                DatabaseValue::UNumber(1),
                DatabaseValue::UNumber(2),
                DatabaseValue::UNumber(3),
            ]
        );
    }
}
