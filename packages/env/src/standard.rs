//! Provider backed by the real process environment.

use std::collections::BTreeMap;

use crate::{EnvError, EnvProvider, Result};

/// Reads variables straight from `std::env`
#[derive(Debug, Clone, Copy)]
pub struct StandardEnv;

impl StandardEnv {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for StandardEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvProvider for StandardEnv {
    fn var(&self, name: &str) -> Result<String> {
        std::env::var(name).map_err(|_| EnvError::NotFound(name.to_string()))
    }

    fn vars(&self) -> BTreeMap<String, String> {
        std::env::vars().collect()
    }
}

static PROVIDER: StandardEnv = StandardEnv::new();

/// Get a process environment variable, treating unset and blank values the
/// same way
#[must_use]
pub fn var_non_empty(name: &str) -> Option<String> {
    PROVIDER.var_non_empty(name)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    #[test_log::test]
    #[serial]
    fn reads_process_variables() {
        unsafe {
            std::env::set_var("STRATA_ENV_TEST_PORT", "8080");
        }

        let env = StandardEnv::new();
        assert_eq!(env.var_parse::<u16>("STRATA_ENV_TEST_PORT").unwrap(), 8080);
        assert!(env.vars().contains_key("STRATA_ENV_TEST_PORT"));
        assert_eq!(var_non_empty("STRATA_ENV_TEST_PORT").as_deref(), Some("8080"));

        unsafe {
            std::env::set_var("STRATA_ENV_TEST_PORT", "  ");
        }

        assert_eq!(var_non_empty("STRATA_ENV_TEST_PORT"), None);

        unsafe {
            std::env::remove_var("STRATA_ENV_TEST_PORT");
        }

        assert!(!env.var_exists("STRATA_ENV_TEST_PORT"));
        assert_eq!(var_non_empty("STRATA_ENV_TEST_PORT"), None);
    }
}
