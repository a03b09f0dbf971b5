//! Typed records for the tables the application knows the shape of.

use chrono::{DateTime, NaiveDateTime};

use crate::{DatabaseError, DatabaseValue, Row, TryFromError};

pub const USERS_TABLE: &str = "users";

pub trait FromRow: Sized {
    /// # Errors
    ///
    /// * If a required column is missing
    /// * If a column holds a value of the wrong type
    fn from_row(row: &Row) -> Result<Self, DatabaseError>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self, DatabaseError> {
        Ok(row.clone())
    }
}

fn required<T>(row: &Row, column: &str) -> Result<T, DatabaseError>
where
    T: TryFrom<DatabaseValue, Error = TryFromError>,
{
    match row.get(column) {
        None | Some(DatabaseValue::Null) => Err(DatabaseError::MissingColumn(column.to_string())),
        Some(value) => T::try_from(value).map_err(|source| DatabaseError::InvalidColumn {
            column: column.to_string(),
            source,
        }),
    }
}

fn optional<T>(row: &Row, column: &str) -> Result<Option<T>, DatabaseError>
where
    T: TryFrom<DatabaseValue, Error = TryFromError>,
{
    match row.get(column) {
        None | Some(DatabaseValue::Null) => Ok(None),
        Some(value) => T::try_from(value)
            .map(Some)
            .map_err(|source| DatabaseError::InvalidColumn {
                column: column.to_string(),
                source,
            }),
    }
}

/// Accepts both native timestamps and the textual forms a remote backend
/// sends back (RFC 3339, with or without an offset).
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|x| x.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

fn optional_timestamp(row: &Row, column: &str) -> Result<Option<NaiveDateTime>, DatabaseError> {
    match row.get_ref(column) {
        None | Some(DatabaseValue::Null) => Ok(None),
        Some(DatabaseValue::DateTime(value)) => Ok(Some(*value)),
        Some(DatabaseValue::String(value)) => {
            parse_timestamp(value)
                .map(Some)
                .ok_or_else(|| DatabaseError::InvalidColumn {
                    column: column.to_string(),
                    source: TryFromError::CouldNotConvert("NaiveDateTime".into()),
                })
        }
        Some(_) => Err(DatabaseError::InvalidColumn {
            column: column.to_string(),
            source: TryFromError::CouldNotConvert("NaiveDateTime".into()),
        }),
    }
}

/// A row of the `users` table
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub grade: Option<DatabaseValue>,
    pub join_date: Option<NaiveDateTime>,
}

impl FromRow for User {
    fn from_row(row: &Row) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: required(row, "id")?,
            username: required(row, "username")?,
            password: optional(row, "password")?,
            full_name: optional(row, "full_name")?,
            email: optional(row, "email")?,
            role: optional(row, "role")?,
            grade: row.get("grade").filter(|x| !x.is_null()),
            join_date: optional_timestamp(row, "join_date")?,
        })
    }
}

/// Candidate record for an insert into `users`.
///
/// `id` and `join_date` are assigned by the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub grade: Option<DatabaseValue>,
}

impl NewUser {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn grade(mut self, grade: impl Into<DatabaseValue>) -> Self {
        self.grade = Some(grade.into());
        self
    }

    /// Columns to insert. Unset optional fields are left out entirely.
    #[must_use]
    pub fn into_values(self) -> Vec<(&'static str, DatabaseValue)> {
        let mut values = vec![("username", DatabaseValue::String(self.username))];

        let optional = [
            ("password", self.password.map(DatabaseValue::String)),
            ("full_name", self.full_name.map(DatabaseValue::String)),
            ("email", self.email.map(DatabaseValue::String)),
            ("role", self.role.map(DatabaseValue::String)),
            ("grade", self.grade),
        ];

        values.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.map(|value| (name, value))),
        );

        values
    }
}
