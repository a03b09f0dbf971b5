//! In-memory stand-in for the remote backend.
//!
//! Only the `users` table is materialized. Every other table accepts the same
//! statements but never retains anything: selects come back empty and inserts
//! echo a synthetic row with a random id.

pub mod filter;

use std::{
    str::FromStr,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use rand::Rng as _;
use thiserror::Error;

use crate::{
    BackendKind, Database, DatabaseError, DatabaseValue, Row,
    models::USERS_TABLE,
    query::{DeleteStatement, InsertStatement, SelectQuery, UpdateStatement},
};

/// How the store treats `update` and `delete` statements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MutationMode {
    /// Succeed without touching the table. Updates echo their values back,
    /// deletes return nothing.
    #[default]
    Echo,
    /// Mutate matching `users` rows and return them
    Apply,
}

#[derive(Debug, Error)]
#[error("Invalid mutation mode '{0}'")]
pub struct ParseMutationModeError(String);

impl FromStr for MutationMode {
    type Err = ParseMutationModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "echo" => Ok(Self::Echo),
            "apply" => Ok(Self::Apply),
            _ => Err(ParseMutationModeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for MutationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Echo => "echo",
            Self::Apply => "apply",
        })
    }
}

#[derive(Debug)]
struct UsersTable {
    rows: Vec<Row>,
    next_id: i64,
}

impl Default for UsersTable {
    fn default() -> Self {
        Self {
            rows: vec![],
            next_id: 1,
        }
    }
}

#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    users: RwLock<UsersTable>,
    mutation_mode: MutationMode,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mutation_mode(mutation_mode: MutationMode) -> Self {
        Self {
            users: RwLock::default(),
            mutation_mode,
        }
    }

    #[must_use]
    pub const fn mutation_mode(&self) -> MutationMode {
        self.mutation_mode
    }

    fn read(&self) -> RwLockReadGuard<'_, UsersTable> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, UsersTable> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_users(&self, records: &[Vec<(&str, DatabaseValue)>], now: NaiveDateTime) -> Vec<Row> {
        let mut users = self.write();
        let mut created = Vec::with_capacity(records.len());

        for record in records {
            let id = users.next_id;
            users.next_id += 1;

            let mut row = Row::new();
            row.set("id", DatabaseValue::Number(id));
            for (name, value) in record {
                if matches!(*name, "id" | "join_date") {
                    log::debug!("insert: ignoring backend-assigned column '{name}'");
                    continue;
                }
                row.set(name, value.clone().resolve(now));
            }
            row.set("join_date", DatabaseValue::DateTime(now));

            users.rows.push(row.clone());
            created.push(row);
        }

        drop(users);

        created
    }

    fn apply_update(&self, statement: &UpdateStatement<'_>, now: NaiveDateTime) -> Vec<Row> {
        let limit = statement.limit.unwrap_or(usize::MAX);
        let mut users = self.write();

        let updated = users
            .rows
            .iter_mut()
            .filter(|row| filter::matches_all(row, &statement.filters, now))
            .take(limit)
            .map(|row| {
                for (name, value) in &statement.values {
                    if *name == "id" {
                        continue;
                    }
                    row.set(name, value.clone().resolve(now));
                }
                row.clone()
            })
            .collect();

        drop(users);

        updated
    }

    fn apply_delete(&self, statement: &DeleteStatement<'_>, now: NaiveDateTime) -> Vec<Row> {
        let limit = statement.limit.unwrap_or(usize::MAX);
        let mut users = self.write();

        let mut deleted = vec![];
        users.rows.retain(|row| {
            if deleted.len() < limit && filter::matches_all(row, &statement.filters, now) {
                deleted.push(row.clone());
                false
            } else {
                true
            }
        });

        drop(users);

        deleted
    }
}

fn synthetic_row(record: &[(&str, DatabaseValue)], now: NaiveDateTime) -> Row {
    let id = rand::rng().random_range(1..=i64::from(u32::MAX));

    let mut row = Row::new();
    row.set("id", DatabaseValue::Number(id));
    for (name, value) in record {
        if *name != "id" {
            row.set(name, value.clone().resolve(now));
        }
    }
    row
}

#[async_trait]
impl Database for MemoryDatabase {
    fn backend(&self) -> BackendKind {
        BackendKind::InMemory
    }

    async fn query(&self, query: &SelectQuery<'_>) -> Result<Vec<Row>, DatabaseError> {
        if query.table_name != USERS_TABLE {
            log::debug!("query: no rows for table '{}'", query.table_name);
            return Ok(vec![]);
        }

        let now = Utc::now().naive_utc();
        let mut rows = self
            .read()
            .rows
            .iter()
            .filter(|row| filter::matches_all(row, &query.filters, now))
            .cloned()
            .collect::<Vec<_>>();

        filter::sort_rows(&mut rows, &query.sorts);

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        strata_logging::debug_or_trace!(
            ("query: {} row(s) from '{}'", rows.len(), query.table_name),
            ("query: {} row(s) from '{}': {rows:?}", rows.len(), query.table_name)
        );

        Ok(rows)
    }

    async fn query_first(&self, query: &SelectQuery<'_>) -> Result<Option<Row>, DatabaseError> {
        Ok(self.query(query).await?.into_iter().next())
    }

    async fn exec_insert(
        &self,
        statement: &InsertStatement<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        let now = Utc::now().naive_utc();

        if statement.table_name != USERS_TABLE {
            log::debug!(
                "exec_insert: echoing {} record(s) for unretained table '{}'",
                statement.records.len(),
                statement.table_name
            );
            return Ok(statement
                .records
                .iter()
                .map(|record| synthetic_row(record, now))
                .collect());
        }

        let rows = self.insert_users(&statement.records, now);
        log::debug!("exec_insert: created {} user(s)", rows.len());

        Ok(rows)
    }

    async fn exec_update(
        &self,
        statement: &UpdateStatement<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        let now = Utc::now().naive_utc();

        match self.mutation_mode {
            MutationMode::Echo => {
                log::debug!(
                    "exec_update: echoing values for '{}' without applying them",
                    statement.table_name
                );
                Ok(vec![
                    statement
                        .values
                        .iter()
                        .map(|(name, value)| (*name, value.clone().resolve(now)))
                        .collect(),
                ])
            }
            MutationMode::Apply if statement.table_name == USERS_TABLE => {
                let rows = self.apply_update(statement, now);
                log::debug!("exec_update: updated {} user(s)", rows.len());
                Ok(rows)
            }
            MutationMode::Apply => Ok(vec![]),
        }
    }

    async fn exec_delete(
        &self,
        statement: &DeleteStatement<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        let now = Utc::now().naive_utc();

        match self.mutation_mode {
            MutationMode::Echo => {
                log::debug!(
                    "exec_delete: leaving '{}' untouched",
                    statement.table_name
                );
                Ok(vec![])
            }
            MutationMode::Apply if statement.table_name == USERS_TABLE => {
                let rows = self.apply_delete(statement, now);
                log::debug!("exec_delete: removed {} user(s)", rows.len());
                Ok(rows)
            }
            MutationMode::Apply => Ok(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::query::FilterableQuery as _;

    #[test_log::test(tokio::test)]
    async fn insert_assigns_id_and_join_date() {
        let db = MemoryDatabase::new();

        let row = db
            .insert(USERS_TABLE)
            .value("id", 99)
            .value("username", "a")
            .execute_first(&db)
            .await
            .into_result()
            .unwrap()
            .unwrap();

        assert_eq!(row.id(), Some(DatabaseValue::Number(1)));
        assert_eq!(row.get("username"), Some(DatabaseValue::from("a")));
        assert!(row.get("join_date").and_then(|x| x.as_datetime()).is_some());
    }

    #[test_log::test(tokio::test)]
    async fn insert_of_no_records_creates_nothing() {
        let db = MemoryDatabase::new();

        let response = db.insert(USERS_TABLE).execute_first(&db).await;

        assert!(response.is_ok());
        assert_eq!(response.data, None);
        assert!(db.select(USERS_TABLE).execute(&db).await.data.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn echo_update_returns_values_without_applying_them() {
        let db = MemoryDatabase::new();
        db.insert(USERS_TABLE)
            .value("username", "a")
            .execute(&db)
            .await
            .into_result()
            .unwrap();

        let response = db
            .update(USERS_TABLE)
            .value("username", "z")
            .where_eq("id", 1)
            .execute(&db)
            .await;

        assert_eq!(
            response.data,
            vec![Row::from_iter([("username", DatabaseValue::from("z"))])]
        );

        let user = db
            .select(USERS_TABLE)
            .where_eq("id", 1)
            .execute_first(&db)
            .await
            .data
            .unwrap();
        assert_eq!(user.get("username"), Some(DatabaseValue::from("a")));
    }

    #[test_log::test(tokio::test)]
    async fn apply_update_never_changes_id() {
        let db = MemoryDatabase::with_mutation_mode(MutationMode::Apply);
        db.insert(USERS_TABLE)
            .value("username", "a")
            .execute(&db)
            .await
            .into_result()
            .unwrap();

        let updated = db
            .update(USERS_TABLE)
            .value("id", 50)
            .value("role", "admin")
            .where_eq("username", "a")
            .execute(&db)
            .await
            .into_result()
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].id(), Some(DatabaseValue::Number(1)));
        assert_eq!(updated[0].get("role"), Some(DatabaseValue::from("admin")));
    }

    #[test_log::test(tokio::test)]
    async fn apply_delete_honors_limit() {
        let db = MemoryDatabase::with_mutation_mode(MutationMode::Apply);
        db.insert(USERS_TABLE)
            .record(vec![("role", "student")])
            .record(vec![("role", "student")])
            .record(vec![("role", "teacher")])
            .execute(&db)
            .await
            .into_result()
            .unwrap();

        let deleted = db
            .delete(USERS_TABLE)
            .where_eq("role", "student")
            .limit(1)
            .execute(&db)
            .await
            .into_result()
            .unwrap();

        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id(), Some(DatabaseValue::Number(1)));

        let remaining = db.select(USERS_TABLE).execute(&db).await.data;
        let ids = remaining.iter().filter_map(Row::id).collect::<Vec<_>>();
        assert_eq!(ids, vec![DatabaseValue::Number(2), DatabaseValue::Number(3)]);
    }

    #[test_log::test]
    fn mutation_mode_from_str() {
        assert_eq!("Echo".parse::<MutationMode>().unwrap(), MutationMode::Echo);
        assert_eq!(" apply ".parse::<MutationMode>().unwrap(), MutationMode::Apply);
        assert!("sometimes".parse::<MutationMode>().is_err());
    }
}
