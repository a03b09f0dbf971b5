#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Backend-agnostic query contract.
//!
//! Callers build statements with the chainable builders in [`query`] and run
//! them against any [`Database`]. Every terminal returns a
//! [`Response`](response::Response) envelope of the same shape whichever
//! backend executed it, so one error-checking branch serves both the
//! [`memory`] fallback store and the [`remote`] client.

#[cfg(feature = "memory")]
pub mod memory;
pub mod models;
pub mod query;
#[cfg(feature = "remote")]
pub mod remote;
pub mod response;

use std::{cmp::Ordering, num::TryFromIntError};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use query::{DeleteStatement, InsertStatement, SelectQuery, UpdateStatement};
use thiserror::Error;

pub use response::Response;

#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    String(String),
    Bool(bool),
    Number(i64),
    UNumber(u64),
    Real(f64),
    DateTime(NaiveDateTime),
    /// Resolved to the current UTC time when the statement executes
    Now,
}

impl DatabaseValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::UNumber(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UNumber(value) => Some(*value),
            Self::Number(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(value) => Some(*value),
            Self::Number(value) => Some(*value as f64),
            Self::UNumber(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    /// Replaces [`DatabaseValue::Now`] with a concrete timestamp
    #[must_use]
    pub fn resolve(self, now: NaiveDateTime) -> Self {
        match self {
            Self::Now => Self::DateTime(now),
            value => value,
        }
    }

    /// Orders two values the way a SQL comparison would.
    ///
    /// Numeric variants compare with each other. `Null` and mismatched types
    /// are incomparable and yield `None`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Number(a), Self::Number(b)) => Some(a.cmp(b)),
            (Self::UNumber(a), Self::UNumber(b)) => Some(a.cmp(b)),
            (Self::Number(a), Self::UNumber(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Self::UNumber(a), Self::Number(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Self::Real(_), _) | (_, Self::Real(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn loosely_eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl<T: Into<Self>> From<Option<T>> for DatabaseValue {
    fn from(val: Option<T>) -> Self {
        val.map_or(Self::Null, Into::into)
    }
}

impl From<bool> for DatabaseValue {
    fn from(val: bool) -> Self {
        Self::Bool(val)
    }
}

impl From<&str> for DatabaseValue {
    fn from(val: &str) -> Self {
        Self::String(val.to_string())
    }
}

impl From<&String> for DatabaseValue {
    fn from(val: &String) -> Self {
        Self::String(val.clone())
    }
}

impl From<String> for DatabaseValue {
    fn from(val: String) -> Self {
        Self::String(val)
    }
}

impl From<f32> for DatabaseValue {
    fn from(val: f32) -> Self {
        Self::Real(f64::from(val))
    }
}

impl From<f64> for DatabaseValue {
    fn from(val: f64) -> Self {
        Self::Real(val)
    }
}

impl From<i32> for DatabaseValue {
    fn from(val: i32) -> Self {
        Self::Number(i64::from(val))
    }
}

impl From<i64> for DatabaseValue {
    fn from(val: i64) -> Self {
        Self::Number(val)
    }
}

impl From<u32> for DatabaseValue {
    fn from(val: u32) -> Self {
        Self::UNumber(u64::from(val))
    }
}

impl From<u64> for DatabaseValue {
    fn from(val: u64) -> Self {
        Self::UNumber(val)
    }
}

impl From<usize> for DatabaseValue {
    fn from(val: usize) -> Self {
        Self::UNumber(val as u64)
    }
}

impl From<NaiveDateTime> for DatabaseValue {
    fn from(val: NaiveDateTime) -> Self {
        Self::DateTime(val)
    }
}

#[derive(Debug, Error)]
pub enum TryFromError {
    #[error("Could not convert to type '{0}'")]
    CouldNotConvert(String),
    #[error(transparent)]
    TryFromInt(#[from] TryFromIntError),
}

impl TryFrom<DatabaseValue> for u64 {
    type Error = TryFromError;

    fn try_from(value: DatabaseValue) -> Result<Self, Self::Error> {
        match value {
            DatabaseValue::Number(value) => Ok(Self::try_from(value)?),
            DatabaseValue::UNumber(value) => Ok(value),
            _ => Err(TryFromError::CouldNotConvert("u64".into())),
        }
    }
}

impl TryFrom<DatabaseValue> for i64 {
    type Error = TryFromError;

    fn try_from(value: DatabaseValue) -> Result<Self, Self::Error> {
        match value {
            DatabaseValue::Number(value) => Ok(value),
            DatabaseValue::UNumber(value) => Ok(Self::try_from(value)?),
            _ => Err(TryFromError::CouldNotConvert("i64".into())),
        }
    }
}

impl TryFrom<DatabaseValue> for String {
    type Error = TryFromError;

    fn try_from(value: DatabaseValue) -> Result<Self, Self::Error> {
        match value {
            DatabaseValue::String(value) => Ok(value),
            _ => Err(TryFromError::CouldNotConvert("String".into())),
        }
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[cfg(feature = "remote")]
    #[error(transparent)]
    Remote(#[from] remote::RemoteDatabaseError),
    #[error("Missing column '{0}'")]
    MissingColumn(String),
    #[error("Invalid value for column '{column}': {source}")]
    InvalidColumn {
        column: String,
        #[source]
        source: TryFromError,
    },
}

impl DatabaseError {
    /// Whether the failure happened before the backend could answer at all
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            #[cfg(feature = "remote")]
            Self::Remote(remote::RemoteDatabaseError::Http(e)) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<(String, DatabaseValue)>,
}

impl Row {
    #[must_use]
    pub const fn new() -> Self {
        Self { columns: vec![] }
    }

    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<DatabaseValue> {
        self.get_ref(column_name).cloned()
    }

    #[must_use]
    pub fn get_ref(&self, column_name: &str) -> Option<&DatabaseValue> {
        self.columns
            .iter()
            .find(|c| c.0 == column_name)
            .map(|c| &c.1)
    }

    #[must_use]
    pub fn id(&self) -> Option<DatabaseValue> {
        self.get("id")
    }

    /// Overwrites `column_name` in place, or appends it if absent
    pub fn set(&mut self, column_name: &str, value: DatabaseValue) {
        if let Some(existing) = self.columns.iter_mut().find(|c| c.0 == column_name) {
            existing.1 = value;
        } else {
            self.columns.push((column_name.to_string(), value));
        }
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>> FromIterator<(K, DatabaseValue)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, DatabaseValue)>>(iter: T) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    InMemory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Remote => "remote",
            Self::InMemory => "in-memory",
        })
    }
}

/// Entry point of a statement chain, bound to one table
#[derive(Debug, Clone, Copy)]
pub struct TableHandle<'a> {
    pub table_name: &'a str,
}

impl<'a> TableHandle<'a> {
    #[must_use]
    pub const fn new(table_name: &'a str) -> Self {
        Self { table_name }
    }

    #[must_use]
    pub fn select(&self) -> SelectQuery<'a> {
        query::select(self.table_name)
    }

    #[must_use]
    pub fn insert(&self) -> InsertStatement<'a> {
        query::insert(self.table_name)
    }

    #[must_use]
    pub fn update(&self) -> UpdateStatement<'a> {
        query::update(self.table_name)
    }

    #[must_use]
    pub fn delete(&self) -> DeleteStatement<'a> {
        query::delete(self.table_name)
    }
}

#[async_trait]
pub trait Database: Send + Sync + std::fmt::Debug {
    fn table<'a>(&self, table_name: &'a str) -> TableHandle<'a> {
        TableHandle::new(table_name)
    }
    fn select<'a>(&self, table_name: &'a str) -> SelectQuery<'a> {
        query::select(table_name)
    }
    fn insert<'a>(&self, table_name: &'a str) -> InsertStatement<'a> {
        query::insert(table_name)
    }
    fn update<'a>(&self, table_name: &'a str) -> UpdateStatement<'a> {
        query::update(table_name)
    }
    fn delete<'a>(&self, table_name: &'a str) -> DeleteStatement<'a> {
        query::delete(table_name)
    }

    fn backend(&self) -> BackendKind;

    async fn query(&self, query: &SelectQuery<'_>) -> Result<Vec<Row>, DatabaseError>;
    async fn query_first(&self, query: &SelectQuery<'_>) -> Result<Option<Row>, DatabaseError>;
    async fn exec_insert(&self, statement: &InsertStatement<'_>)
    -> Result<Vec<Row>, DatabaseError>;
    async fn exec_update(&self, statement: &UpdateStatement<'_>)
    -> Result<Vec<Row>, DatabaseError>;
    async fn exec_delete(&self, statement: &DeleteStatement<'_>)
    -> Result<Vec<Row>, DatabaseError>;
}
