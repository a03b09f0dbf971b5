//! The `{ data, error }` envelope every statement resolves to.
//!
//! Backends report failures through `error` and leave `data` at its default
//! (an empty collection or `None`), so callers can use a single
//! `if let Some(error) = response.error` branch for every backend.

use crate::{DatabaseError, Row, models::FromRow};

#[derive(Debug)]
#[must_use]
pub struct Response<T> {
    pub data: T,
    pub error: Option<DatabaseError>,
}

impl<T> Response<T> {
    pub const fn ok(data: T) -> Self {
        Self { data, error: None }
    }

    pub fn err(error: DatabaseError) -> Self
    where
        T: Default,
    {
        Self {
            data: T::default(),
            error: Some(error),
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// # Errors
    ///
    /// * If the envelope carries an error
    pub fn into_result(self) -> Result<T, DatabaseError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            data: f(self.data),
            error: self.error,
        }
    }
}

impl<T: Default> From<Result<T, DatabaseError>> for Response<T> {
    fn from(value: Result<T, DatabaseError>) -> Self {
        match value {
            Ok(data) => Self::ok(data),
            Err(error) => Self::err(error),
        }
    }
}

impl Response<Vec<Row>> {
    /// Converts every row into a typed record
    pub fn decode<R: FromRow>(self) -> Response<Vec<R>> {
        if let Some(error) = self.error {
            return Response::err(error);
        }

        self.data
            .iter()
            .map(R::from_row)
            .collect::<Result<Vec<_>, _>>()
            .into()
    }
}

impl Response<Option<Row>> {
    /// Converts the row, if any, into a typed record
    pub fn decode<R: FromRow>(self) -> Response<Option<R>> {
        if let Some(error) = self.error {
            return Response::err(error);
        }

        self.data.as_ref().map(R::from_row).transpose().into()
    }
}
