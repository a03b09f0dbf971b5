#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Picks the backend a process talks to.
//!
//! [`select_backend`] turns a [`ConnectionConfig`] into a [`Connection`] that
//! is either backed by the remote PostgREST client or by the in-memory
//! fallback store. Selection never fails: every problem along the way is
//! logged and recorded as a [`FallbackReason`], and the caller still gets a
//! usable connection.

use std::{
    str::FromStr,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use strata_database::{
    BackendKind, Database, DatabaseError, Row,
    memory::{MemoryDatabase, MutationMode},
    models::USERS_TABLE,
    query::{DeleteStatement, InsertStatement, SelectQuery, UpdateStatement},
    remote::{RemoteDatabase, RemoteDatabaseError},
};
use strata_env::EnvProvider;
use thiserror::Error;

pub const REMOTE_URL_VAR: &str = "STRATA_REMOTE_URL";
pub const REMOTE_KEY_VAR: &str = "STRATA_REMOTE_KEY";
pub const DEPLOYMENT_VAR: &str = "STRATA_DEPLOYMENT";
pub const STORAGE_MODE_VAR: &str = "STRATA_STORAGE_MODE";
pub const USE_REMOTE_VAR: &str = "STRATA_USE_REMOTE";
pub const FALLBACK_MUTATIONS_VAR: &str = "STRATA_FALLBACK_MUTATIONS";
pub const REMOTE_SCHEMA_VAR: &str = "STRATA_REMOTE_SCHEMA";

pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Error)]
pub enum ParseConfigError {
    #[error("Invalid storage mode '{0}'")]
    StorageMode(String),
    #[error("Invalid deployment '{0}'")]
    Deployment(String),
    #[error("Invalid flag '{0}'")]
    Flag(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageMode {
    /// Always try the remote backend, whatever the deployment
    Remote,
    /// Never touch the remote backend
    InMemory,
    /// Remote, except on production deployments
    #[default]
    Auto,
}

impl FromStr for StorageMode {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "in_memory" | "in-memory" | "memory" => Ok(Self::InMemory),
            "auto" => Ok(Self::Auto),
            _ => Err(ParseConfigError::StorageMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Deployment {
    #[default]
    Development,
    Production,
}

impl FromStr for Deployment {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "test" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ParseConfigError::Deployment(s.to_string())),
        }
    }
}

fn parse_flag(value: &str) -> Result<bool, ParseConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ParseConfigError::Flag(value.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub remote_url: Option<String>,
    pub remote_key: Option<String>,
    pub deployment: Deployment,
    pub storage_mode: StorageMode,
    pub remote_enabled: bool,
    pub mutation_mode: MutationMode,
    pub schema: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_key: None,
            deployment: Deployment::default(),
            storage_mode: StorageMode::default(),
            remote_enabled: true,
            mutation_mode: MutationMode::default(),
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

fn parse_or_default<T, E>(env: &E, name: &str, parse: impl Fn(&str) -> Result<T, String>) -> Option<T>
where
    E: EnvProvider + ?Sized,
{
    let value = env.var_non_empty(name)?;
    match parse(&value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            log::warn!("Ignoring {name}: {e}");
            None
        }
    }
}

impl ConnectionConfig {
    /// Reads the configuration from `env`. Blank variables count as unset and
    /// unparseable ones are replaced by their defaults.
    #[must_use]
    pub fn from_env<E: EnvProvider + ?Sized>(env: &E) -> Self {
        let defaults = Self::default();

        Self {
            remote_url: env.var_non_empty(REMOTE_URL_VAR),
            remote_key: env.var_non_empty(REMOTE_KEY_VAR),
            deployment: parse_or_default(env, DEPLOYMENT_VAR, |x| {
                x.parse::<Deployment>().map_err(|e| e.to_string())
            })
            .unwrap_or(defaults.deployment),
            storage_mode: parse_or_default(env, STORAGE_MODE_VAR, |x| {
                x.parse::<StorageMode>().map_err(|e| e.to_string())
            })
            .unwrap_or(defaults.storage_mode),
            remote_enabled: parse_or_default(env, USE_REMOTE_VAR, |x| {
                parse_flag(x).map_err(|e| e.to_string())
            })
            .unwrap_or(defaults.remote_enabled),
            mutation_mode: parse_or_default(env, FALLBACK_MUTATIONS_VAR, |x| {
                x.parse::<MutationMode>().map_err(|e| e.to_string())
            })
            .unwrap_or(defaults.mutation_mode),
            schema: env
                .var_non_empty(REMOTE_SCHEMA_VAR)
                .unwrap_or(defaults.schema),
        }
    }
}

/// Why a connection ended up on the in-memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    ForcedInMemory,
    RemoteDisabled,
    Production,
    MissingCredentials,
    InsecureUrl,
    ConstructionFailed,
    ProbeFailed,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ForcedInMemory => "in-memory storage requested",
            Self::RemoteDisabled => "remote backend disabled",
            Self::Production => "remote backend disabled on production deployments",
            Self::MissingCredentials => "remote credentials missing",
            Self::InsecureUrl => "remote URL is not https",
            Self::ConstructionFailed => "remote client could not be created",
            Self::ProbeFailed => "remote backend unreachable",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Remote,
    Fallback(FallbackReason),
}

/// A process-wide handle on whichever backend is active.
///
/// The in-memory store is always present so that a failed probe can switch
/// over without rebuilding the connection. Once on the fallback, the
/// connection never goes back to the remote backend.
#[derive(Debug)]
pub struct Connection {
    fallback: Arc<MemoryDatabase>,
    remote: Option<Arc<dyn Database>>,
    state: RwLock<BackendState>,
}

impl Connection {
    #[must_use]
    pub fn new_fallback(fallback: MemoryDatabase, reason: FallbackReason) -> Self {
        Self {
            fallback: Arc::new(fallback),
            remote: None,
            state: RwLock::new(BackendState::Fallback(reason)),
        }
    }

    #[must_use]
    pub fn new_remote(remote: Arc<dyn Database>, fallback: MemoryDatabase) -> Self {
        Self {
            fallback: Arc::new(fallback),
            remote: Some(remote),
            state: RwLock::new(BackendState::Remote),
        }
    }

    #[must_use]
    pub fn state(&self) -> BackendState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self.state() {
            BackendState::Remote => None,
            BackendState::Fallback(reason) => Some(reason),
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.state() == BackendState::Remote
    }

    #[must_use]
    pub fn fallback_store(&self) -> &MemoryDatabase {
        &self.fallback
    }

    fn active_remote(&self) -> Option<&Arc<dyn Database>> {
        match self.state() {
            BackendState::Remote => self.remote.as_ref(),
            BackendState::Fallback(_) => None,
        }
    }

    fn active(&self) -> &dyn Database {
        match self.active_remote() {
            Some(remote) => remote.as_ref(),
            None => self.fallback.as_ref(),
        }
    }

    fn switch_to_fallback(&self, reason: FallbackReason) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) =
            BackendState::Fallback(reason);
        log::warn!("Switched to in-memory storage: {reason}");
    }

    /// Checks that the remote backend answers a trivial read.
    ///
    /// Returns `false` when the fallback is already active, or when the probe
    /// fails, in which case the connection switches to the fallback for the
    /// rest of its life.
    pub async fn init(&self) -> bool {
        let Some(remote) = self.active_remote().cloned() else {
            log::info!(
                "Using in-memory storage ({})",
                self.fallback_reason()
                    .unwrap_or(FallbackReason::RemoteDisabled)
            );
            return false;
        };

        let response = remote
            .select(USERS_TABLE)
            .columns(&["count"])
            .limit(1)
            .execute(remote.as_ref())
            .await;

        match response.error {
            None => {
                log::info!("Connected to remote database");
                true
            }
            Some(e) => {
                log_probe_failure(&e);
                self.switch_to_fallback(FallbackReason::ProbeFailed);
                false
            }
        }
    }
}

fn log_probe_failure(error: &DatabaseError) {
    if let DatabaseError::Remote(RemoteDatabaseError::Api {
        message,
        details,
        hint,
        code,
        ..
    }) = error
    {
        log::error!(
            "Remote database probe failed: message={message} code={code:?} details={details:?} hint={hint:?}"
        );
    } else {
        log::error!("Remote database probe failed: {error}");
    }
}

fn try_remote(config: &ConnectionConfig) -> Result<RemoteDatabase, FallbackReason> {
    if config.storage_mode == StorageMode::InMemory {
        log::info!("In-memory storage requested");
        return Err(FallbackReason::ForcedInMemory);
    }
    if !config.remote_enabled {
        log::info!("Remote backend disabled by {USE_REMOTE_VAR}");
        return Err(FallbackReason::RemoteDisabled);
    }
    if config.storage_mode == StorageMode::Auto && config.deployment == Deployment::Production {
        log::info!("Remote backend is not used on production deployments");
        return Err(FallbackReason::Production);
    }

    let (Some(url), Some(key)) = (
        config.remote_url.as_deref().filter(|x| !x.trim().is_empty()),
        config.remote_key.as_deref().filter(|x| !x.trim().is_empty()),
    ) else {
        log::error!("Missing remote credentials: set {REMOTE_URL_VAR} and {REMOTE_KEY_VAR}");
        return Err(FallbackReason::MissingCredentials);
    };

    if !url.starts_with("https://") {
        log::warn!("Remote URL '{url}' does not start with https://, using in-memory storage");
        return Err(FallbackReason::InsecureUrl);
    }

    RemoteDatabase::new(url, key, config.schema.as_str()).map_err(|e| {
        log::error!("Failed to create remote client: {e}");
        FallbackReason::ConstructionFailed
    })
}

/// Decides which backend to use. Never fails; see [`FallbackReason`] for
/// the ways this can end up on the in-memory store.
#[must_use]
pub fn select_backend(config: &ConnectionConfig) -> Connection {
    let fallback = MemoryDatabase::with_mutation_mode(config.mutation_mode);

    match try_remote(config) {
        Ok(remote) => {
            log::info!("Using remote database (schema={})", remote.schema());
            Connection::new_remote(Arc::new(remote), fallback)
        }
        Err(reason) => {
            log::info!(
                "Using in-memory storage ({reason}, mutations={})",
                config.mutation_mode
            );
            Connection::new_fallback(fallback, reason)
        }
    }
}

/// Loads a [`ConnectionConfig`] from the process environment and selects a
/// backend with it.
#[must_use]
pub fn init_from_env() -> Connection {
    select_backend(&ConnectionConfig::from_env(&strata_env::standard::StandardEnv::new()))
}

#[async_trait]
impl Database for Connection {
    fn backend(&self) -> BackendKind {
        self.active().backend()
    }

    async fn query(&self, query: &SelectQuery<'_>) -> Result<Vec<Row>, DatabaseError> {
        self.active().query(query).await
    }

    async fn query_first(&self, query: &SelectQuery<'_>) -> Result<Option<Row>, DatabaseError> {
        self.active().query_first(query).await
    }

    async fn exec_insert(
        &self,
        statement: &InsertStatement<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        self.active().exec_insert(statement).await
    }

    async fn exec_update(
        &self,
        statement: &UpdateStatement<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        self.active().exec_update(statement).await
    }

    async fn exec_delete(
        &self,
        statement: &DeleteStatement<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        self.active().exec_delete(statement).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use strata_database::{DatabaseValue, models::NewUser, query::FilterableQuery as _};
    use strata_env::simulator::SimulatorEnv;

    use super::*;

    fn remote_config(url: &str) -> ConnectionConfig {
        ConnectionConfig {
            remote_url: Some(url.to_string()),
            remote_key: Some("anon-key".to_string()),
            ..ConnectionConfig::default()
        }
    }

    #[derive(Debug)]
    struct AnsweringRemote;

    #[async_trait]
    impl Database for AnsweringRemote {
        fn backend(&self) -> BackendKind {
            BackendKind::Remote
        }

        async fn query(&self, _query: &SelectQuery<'_>) -> Result<Vec<Row>, DatabaseError> {
            Ok(vec![Row::from_iter([("count", DatabaseValue::Number(0))])])
        }

        async fn query_first(
            &self,
            _query: &SelectQuery<'_>,
        ) -> Result<Option<Row>, DatabaseError> {
            Ok(None)
        }

        async fn exec_insert(
            &self,
            _statement: &InsertStatement<'_>,
        ) -> Result<Vec<Row>, DatabaseError> {
            Ok(vec![])
        }

        async fn exec_update(
            &self,
            _statement: &UpdateStatement<'_>,
        ) -> Result<Vec<Row>, DatabaseError> {
            Ok(vec![])
        }

        async fn exec_delete(
            &self,
            _statement: &DeleteStatement<'_>,
        ) -> Result<Vec<Row>, DatabaseError> {
            Ok(vec![])
        }
    }

    #[test_log::test]
    fn valid_https_credentials_select_remote() {
        let connection = select_backend(&remote_config("https://db.example.com"));

        assert_eq!(connection.state(), BackendState::Remote);
        assert_eq!(connection.backend(), BackendKind::Remote);
    }

    #[test_log::test]
    fn production_with_auto_mode_selects_fallback() {
        let config = ConnectionConfig {
            deployment: Deployment::Production,
            ..remote_config("https://db.example.com")
        };

        let connection = select_backend(&config);

        assert_eq!(connection.fallback_reason(), Some(FallbackReason::Production));
        assert_eq!(connection.backend(), BackendKind::InMemory);
    }

    #[test_log::test]
    fn remote_mode_skips_the_production_rule() {
        let config = ConnectionConfig {
            deployment: Deployment::Production,
            storage_mode: StorageMode::Remote,
            ..remote_config("https://db.example.com")
        };

        assert!(select_backend(&config).is_remote());
    }

    #[test_log::test]
    fn missing_credentials_select_fallback() {
        let config = ConnectionConfig {
            remote_key: Some("   ".to_string()),
            ..remote_config("https://db.example.com")
        };

        assert_eq!(
            select_backend(&config).fallback_reason(),
            Some(FallbackReason::MissingCredentials)
        );
        assert_eq!(
            select_backend(&ConnectionConfig::default()).fallback_reason(),
            Some(FallbackReason::MissingCredentials)
        );
    }

    #[test_log::test]
    fn http_url_selects_fallback() {
        assert_eq!(
            select_backend(&remote_config("http://db.example.com")).fallback_reason(),
            Some(FallbackReason::InsecureUrl)
        );
    }

    #[test_log::test]
    fn unparseable_url_selects_fallback() {
        assert_eq!(
            select_backend(&remote_config("https://")).fallback_reason(),
            Some(FallbackReason::ConstructionFailed)
        );
    }

    #[test_log::test]
    fn in_memory_mode_wins_over_everything() {
        let config = ConnectionConfig {
            storage_mode: StorageMode::InMemory,
            remote_enabled: false,
            ..remote_config("https://db.example.com")
        };

        assert_eq!(
            select_backend(&config).fallback_reason(),
            Some(FallbackReason::ForcedInMemory)
        );
    }

    #[test_log::test]
    fn disabled_override_selects_fallback() {
        let config = ConnectionConfig {
            remote_enabled: false,
            ..remote_config("https://db.example.com")
        };

        assert_eq!(
            select_backend(&config).fallback_reason(),
            Some(FallbackReason::RemoteDisabled)
        );
    }

    #[test_log::test]
    fn from_env_reads_every_variable() {
        let env = SimulatorEnv::from_vars([
            (REMOTE_URL_VAR, "https://db.example.com"),
            (REMOTE_KEY_VAR, "anon-key"),
            (DEPLOYMENT_VAR, "production"),
            (STORAGE_MODE_VAR, "remote"),
            (USE_REMOTE_VAR, "yes"),
            (FALLBACK_MUTATIONS_VAR, "apply"),
            (REMOTE_SCHEMA_VAR, "school"),
        ]);

        assert_eq!(
            ConnectionConfig::from_env(&env),
            ConnectionConfig {
                remote_url: Some("https://db.example.com".to_string()),
                remote_key: Some("anon-key".to_string()),
                deployment: Deployment::Production,
                storage_mode: StorageMode::Remote,
                remote_enabled: true,
                mutation_mode: MutationMode::Apply,
                schema: "school".to_string(),
            }
        );
    }

    #[test_log::test]
    fn from_env_replaces_bad_values_with_defaults() {
        let env = SimulatorEnv::from_vars([
            (REMOTE_URL_VAR, ""),
            (DEPLOYMENT_VAR, "staging"),
            (STORAGE_MODE_VAR, "sometimes"),
            (USE_REMOTE_VAR, "maybe"),
            (FALLBACK_MUTATIONS_VAR, "never"),
        ]);

        assert_eq!(ConnectionConfig::from_env(&env), ConnectionConfig::default());
    }

    #[test_log::test]
    fn from_env_reads_disabled_override() {
        let env = SimulatorEnv::from_vars([(USE_REMOTE_VAR, "false")]);

        assert!(!ConnectionConfig::from_env(&env).remote_enabled);
    }

    #[test_log::test]
    fn storage_mode_accepts_aliases() {
        assert_eq!("in-memory".parse::<StorageMode>().unwrap(), StorageMode::InMemory);
        assert_eq!("MEMORY".parse::<StorageMode>().unwrap(), StorageMode::InMemory);
        assert_eq!("Auto".parse::<StorageMode>().unwrap(), StorageMode::Auto);
    }

    #[test_log::test]
    #[serial]
    fn init_from_env_uses_the_process_environment() {
        unsafe {
            std::env::set_var(STORAGE_MODE_VAR, "in_memory");
        }

        let connection = init_from_env();

        unsafe {
            std::env::remove_var(STORAGE_MODE_VAR);
        }

        assert_eq!(
            connection.fallback_reason(),
            Some(FallbackReason::ForcedInMemory)
        );
    }

    #[test_log::test(tokio::test)]
    async fn probe_on_fallback_returns_false() {
        let connection = select_backend(&ConnectionConfig::default());

        assert!(!connection.init().await);
        assert_eq!(
            connection.fallback_reason(),
            Some(FallbackReason::MissingCredentials)
        );
    }

    #[test_log::test(tokio::test)]
    async fn probe_against_answering_remote_returns_true() {
        let connection = Connection::new_remote(Arc::new(AnsweringRemote), MemoryDatabase::new());

        assert!(connection.init().await);
        assert!(connection.is_remote());
    }

    #[test_log::test(tokio::test)]
    async fn failed_probe_switches_to_fallback_for_good() {
        let connection = select_backend(&remote_config("https://127.0.0.1:9"));
        assert!(connection.is_remote());

        assert!(!connection.init().await);
        assert_eq!(
            connection.fallback_reason(),
            Some(FallbackReason::ProbeFailed)
        );
        assert_eq!(connection.backend(), BackendKind::InMemory);

        let created = connection
            .table(USERS_TABLE)
            .insert()
            .values(NewUser::new("a").into_values())
            .execute_first(&connection)
            .await;
        assert!(created.is_ok());
        assert_eq!(
            created.data.and_then(|row| row.id()),
            Some(DatabaseValue::Number(1))
        );

        assert!(!connection.init().await);
        assert_eq!(
            connection
                .table(USERS_TABLE)
                .select()
                .where_eq("username", "a")
                .execute(&connection)
                .await
                .data
                .len(),
            1
        );
    }
}
