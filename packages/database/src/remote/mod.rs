//! PostgREST client speaking the same statement contract as the in-memory
//! store.
//!
//! Every table lives at `{url}/rest/v1/{table}`. Filters, ordering and limits
//! are rendered into query-string parameters by [`params`], row payloads are
//! exchanged as JSON.

pub mod params;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use reqwest::{
    Client, Method, RequestBuilder, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue},
};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::{
    BackendKind, Database, DatabaseError, DatabaseValue, Row,
    query::{BooleanExpression, DeleteStatement, InsertStatement, SelectQuery, UpdateStatement},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RemoteDatabaseError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Remote request failed with status {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },
    #[error("Unexpected response body: {0}")]
    UnexpectedBody(String),
}

#[derive(Debug, Error)]
pub enum InitRemoteError {
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),
    #[error(transparent)]
    InvalidKey(#[from] InvalidHeaderValue),
    #[error(transparent)]
    Client(#[from] reqwest::Error),
}

pub struct RemoteDatabase {
    client: Client,
    rest_url: Url,
    schema: String,
}

impl std::fmt::Debug for RemoteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDatabase")
            .field("rest_url", &self.rest_url.as_str())
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

fn sensitive(value: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut value = HeaderValue::from_str(value)?;
    value.set_sensitive(true);
    Ok(value)
}

impl RemoteDatabase {
    /// # Errors
    ///
    /// * If `url` cannot be parsed or is not an `http(s)` URL
    /// * If `key` or `schema` cannot be sent as a header value
    /// * If the HTTP client fails to build
    pub fn new(url: &str, key: &str, schema: impl Into<String>) -> Result<Self, InitRemoteError> {
        let schema = schema.into();
        let mut rest_url = Url::parse(url)?;

        if !matches!(rest_url.scheme(), "http" | "https") || rest_url.cannot_be_a_base() {
            return Err(InitRemoteError::UnsupportedScheme(
                rest_url.scheme().to_string(),
            ));
        }

        if let Ok(mut segments) = rest_url.path_segments_mut() {
            segments.pop_if_empty().extend(["rest", "v1"]);
        }

        let mut headers = HeaderMap::new();
        headers.insert("apikey", sensitive(key)?);
        headers.insert(AUTHORIZATION, sensitive(&format!("Bearer {key}"))?);
        headers.insert("accept-profile", HeaderValue::from_str(&schema)?);
        headers.insert("content-profile", HeaderValue::from_str(&schema)?);

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        log::debug!("Created remote client for {rest_url} (schema={schema})");

        Ok(Self {
            client,
            rest_url,
            schema,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn table_url(&self, table_name: &str) -> Url {
        let mut url = self.rest_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(table_name);
        }
        url
    }

    fn request(&self, method: Method, table_name: &str) -> RequestBuilder {
        self.client.request(method, self.table_url(table_name))
    }

    fn with_body(
        request: RequestBuilder,
        body: &Value,
        prefer: &str,
    ) -> Result<RequestBuilder, RemoteDatabaseError> {
        Ok(request
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", prefer)
            .body(serde_json::to_vec(body)?))
    }

    async fn send(request: RequestBuilder) -> Result<Vec<Row>, RemoteDatabaseError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        strata_logging::debug_or_trace!(
            ("send: status={status} bytes={}", body.len()),
            (
                "send: status={status} body={}",
                String::from_utf8_lossy(&body)
            )
        );

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(vec![]);
        }

        rows_from_json(serde_json::from_slice(&body)?)
    }
}

fn api_error(status: StatusCode, body: &[u8]) -> RemoteDatabaseError {
    let value = serde_json::from_slice::<Value>(body).unwrap_or(Value::Null);
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(ToString::to_string)
    };

    RemoteDatabaseError::Api {
        status: status.as_u16(),
        code: field("code"),
        message: field("message").unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        }),
        details: field("details"),
        hint: field("hint"),
    }
}

/// Converts a JSON scalar into a value. Nested arrays and objects are kept
/// as their JSON text.
#[must_use]
pub fn value_from_json(value: Value) -> DatabaseValue {
    match value {
        Value::Null => DatabaseValue::Null,
        Value::Bool(value) => DatabaseValue::Bool(value),
        Value::Number(number) => number
            .as_i64()
            .map(DatabaseValue::Number)
            .or_else(|| number.as_u64().map(DatabaseValue::UNumber))
            .or_else(|| number.as_f64().map(DatabaseValue::Real))
            .unwrap_or(DatabaseValue::Null),
        Value::String(value) => DatabaseValue::String(value),
        value @ (Value::Array(_) | Value::Object(_)) => DatabaseValue::String(value.to_string()),
    }
}

#[must_use]
pub fn value_to_json(value: &DatabaseValue, now: NaiveDateTime) -> Value {
    match value {
        DatabaseValue::Null => Value::Null,
        DatabaseValue::String(value) => Value::String(value.clone()),
        DatabaseValue::Bool(value) => Value::Bool(*value),
        DatabaseValue::Number(value) => Value::from(*value),
        DatabaseValue::UNumber(value) => Value::from(*value),
        DatabaseValue::Real(value) => {
            serde_json::Number::from_f64(*value).map_or(Value::Null, Value::Number)
        }
        DatabaseValue::DateTime(value) => {
            Value::String(value.format(params::TIMESTAMP_FORMAT).to_string())
        }
        DatabaseValue::Now => Value::String(now.format(params::TIMESTAMP_FORMAT).to_string()),
    }
}

fn row_from_json(object: Map<String, Value>) -> Row {
    object
        .into_iter()
        .map(|(name, value)| (name, value_from_json(value)))
        .collect()
}

fn record_to_json(record: &[(&str, DatabaseValue)], now: NaiveDateTime) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(name, value)| ((*name).to_string(), value_to_json(value, now)))
            .collect(),
    )
}

/// # Errors
///
/// * If the body is neither an object nor an array of objects
pub fn rows_from_json(value: Value) -> Result<Vec<Row>, RemoteDatabaseError> {
    match value {
        Value::Object(object) => Ok(vec![row_from_json(object)]),
        Value::Array(values) => values
            .into_iter()
            .map(|value| match value {
                Value::Object(object) => Ok(row_from_json(object)),
                value => Err(RemoteDatabaseError::UnexpectedBody(value.to_string())),
            })
            .collect(),
        value => Err(RemoteDatabaseError::UnexpectedBody(value.to_string())),
    }
}

fn warn_unsupported_limit(statement: &str, limit: Option<usize>) {
    if let Some(limit) = limit {
        log::warn!("{statement}: limit={limit} is not sent to the remote backend");
    }
}

/// Returns whether the statement targets the whole table
fn warn_unfiltered(
    statement: &str,
    table_name: &str,
    filters: &[Box<dyn BooleanExpression>],
) -> bool {
    let unfiltered = filters.is_empty();
    if unfiltered {
        log::warn!("{statement}: no filters, every row of '{table_name}' is affected");
    }
    unfiltered
}

#[async_trait]
impl Database for RemoteDatabase {
    fn backend(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn query(&self, query: &SelectQuery<'_>) -> Result<Vec<Row>, DatabaseError> {
        let params = params::select_params(query, Utc::now().naive_utc());
        log::debug!("query: table={} params={params:?}", query.table_name);

        let request = self.request(Method::GET, query.table_name).query(&params);

        Ok(Self::send(request).await?)
    }

    async fn query_first(&self, query: &SelectQuery<'_>) -> Result<Option<Row>, DatabaseError> {
        let mut params = params::select_params(query, Utc::now().naive_utc());
        if query.limit.is_none() {
            params.push(("limit".to_string(), "1".to_string()));
        }
        log::debug!("query_first: table={} params={params:?}", query.table_name);

        let request = self.request(Method::GET, query.table_name).query(&params);

        Ok(Self::send(request).await?.into_iter().next())
    }

    async fn exec_insert(
        &self,
        statement: &InsertStatement<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        if statement.records.is_empty() {
            return Ok(vec![]);
        }

        let now = Utc::now().naive_utc();
        let params = params::insert_params(&statement.records);
        let body = Value::Array(
            statement
                .records
                .iter()
                .map(|record| record_to_json(record, now))
                .collect(),
        );
        strata_logging::debug_or_trace!(
            (
                "exec_insert: table={} records={}",
                statement.table_name,
                statement.records.len()
            ),
            (
                "exec_insert: table={} params={params:?} body={body}",
                statement.table_name
            )
        );

        let request = self
            .request(Method::POST, statement.table_name)
            .query(&params);
        let request = Self::with_body(request, &body, "return=representation,missing=default")?;

        Ok(Self::send(request).await?)
    }

    async fn exec_update(
        &self,
        statement: &UpdateStatement<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        warn_unsupported_limit("exec_update", statement.limit);
        warn_unfiltered("exec_update", statement.table_name, &statement.filters);

        let now = Utc::now().naive_utc();
        let params = params::filter_params(&statement.filters, now);
        let body = record_to_json(&statement.values, now);
        log::debug!(
            "exec_update: table={} params={params:?}",
            statement.table_name
        );

        let request = self
            .request(Method::PATCH, statement.table_name)
            .query(&params);
        let request = Self::with_body(request, &body, "return=representation")?;

        Ok(Self::send(request).await?)
    }

    async fn exec_delete(
        &self,
        statement: &DeleteStatement<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        warn_unsupported_limit("exec_delete", statement.limit);
        warn_unfiltered("exec_delete", statement.table_name, &statement.filters);

        let params = params::filter_params(&statement.filters, Utc::now().naive_utc());
        log::debug!(
            "exec_delete: table={} params={params:?}",
            statement.table_name
        );

        let request = self
            .request(Method::DELETE, statement.table_name)
            .query(&params)
            .header("Prefer", "return=representation");

        Ok(Self::send(request).await?)
    }
}
