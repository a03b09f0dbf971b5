#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Environment variable access behind a swappable provider.
//!
//! Configuration code takes a `&dyn EnvProvider` (or a generic
//! `E: EnvProvider`) instead of reading `std::env` directly, so tests can feed
//! it a [`simulator::SimulatorEnv`] with exactly the variables they need.

use std::collections::BTreeMap;

use thiserror::Error;

#[cfg(feature = "std")]
pub mod standard;

#[cfg(feature = "simulator")]
pub mod simulator;

#[cfg(feature = "std")]
pub use standard::var_non_empty;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Environment variable '{0}' not found")]
    NotFound(String),
    #[error("Failed to parse environment variable '{0}': {1}")]
    ParseError(String, String),
}

pub type Result<T> = std::result::Result<T, EnvError>;

pub trait EnvProvider: Send + Sync {
    /// Get an environment variable as a string
    ///
    /// # Errors
    ///
    /// * If the environment variable is not found
    fn var(&self, name: &str) -> Result<String>;

    /// Get all environment variables
    fn vars(&self) -> BTreeMap<String, String>;

    /// Get an environment variable with a default value
    fn var_or(&self, name: &str, default: &str) -> String {
        self.var(name).unwrap_or_else(|_| default.to_string())
    }

    /// Get an environment variable parsed as a specific type
    ///
    /// # Errors
    ///
    /// * If the environment variable is not found
    /// * If the environment variable value cannot be parsed to the target type
    fn var_parse<T>(&self, name: &str) -> Result<T>
    where
        Self: Sized,
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.var(name)?;
        value
            .parse::<T>()
            .map_err(|e| EnvError::ParseError(name.to_string(), e.to_string()))
    }

    /// Get an environment variable parsed with a default value
    fn var_parse_or<T>(&self, name: &str, default: T) -> T
    where
        Self: Sized,
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.var_parse(name).unwrap_or(default)
    }

    /// Get an optional environment variable parsed as a specific type
    ///
    /// # Returns
    ///
    /// * `Ok(Some(value))` if the variable exists and parses successfully
    /// * `Ok(None)` if the variable doesn't exist
    /// * `Err(EnvError::ParseError)` if the variable exists but can't be parsed
    ///
    /// # Errors
    ///
    /// * If the environment variable exists but cannot be parsed to the target type
    fn var_parse_opt<T>(&self, name: &str) -> Result<Option<T>>
    where
        Self: Sized,
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.var(name) {
            Ok(value) => value
                .parse::<T>()
                .map(Some)
                .map_err(|e| EnvError::ParseError(name.to_string(), e.to_string())),
            Err(EnvError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if an environment variable exists
    fn var_exists(&self, name: &str) -> bool {
        self.var(name).is_ok()
    }

    /// Get a variable, treating unset and blank values the same way
    fn var_non_empty(&self, name: &str) -> Option<String> {
        self.var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

#[cfg(all(test, feature = "simulator"))]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::simulator::SimulatorEnv;

    #[test_log::test]
    fn var_parse_opt_returns_none_for_missing_variable() {
        let env = SimulatorEnv::empty();

        assert_eq!(env.var_parse_opt::<u16>("PORT").unwrap(), None);
    }

    #[test_log::test]
    fn var_parse_opt_reports_unparseable_value() {
        let env = SimulatorEnv::from_vars([("PORT", "eighty")]);

        let err = env.var_parse_opt::<u16>("PORT").unwrap_err();

        assert!(matches!(err, EnvError::ParseError(name, _) if name == "PORT"));
    }

    #[test_log::test]
    fn var_parse_or_falls_back_on_parse_error() {
        let env = SimulatorEnv::from_vars([("RETRIES", "many")]);

        assert_eq!(env.var_parse_or("RETRIES", 3_u32), 3);
    }

    #[test_log::test]
    fn var_non_empty_ignores_blank_values() {
        let env = SimulatorEnv::from_vars([("BLANK", "   "), ("SET", " value ")]);

        assert_eq!(env.var_non_empty("BLANK"), None);
        assert_eq!(env.var_non_empty("MISSING"), None);
        assert_eq!(env.var_non_empty("SET"), Some("value".to_string()));
    }
}
