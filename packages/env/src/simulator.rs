//! Isolated environment for tests and simulations.
//!
//! A [`SimulatorEnv`] keeps its own variable map, separate from the process
//! environment, so configuration can be exercised deterministically without
//! touching `std::env`.
//!
//! ```rust
//! use strata_env::{EnvProvider, simulator::SimulatorEnv};
//!
//! let env = SimulatorEnv::empty();
//! env.set_var("STRATA_STORAGE_MODE", "remote");
//!
//! assert_eq!(env.var("STRATA_STORAGE_MODE").unwrap(), "remote");
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::{EnvError, EnvProvider, Result};

#[derive(Debug, Clone)]
pub struct SimulatorEnv {
    vars: Arc<RwLock<BTreeMap<String, String>>>,
}

impl SimulatorEnv {
    /// Creates a simulator environment seeded from the real process
    /// environment, with the simulator defaults filled in where unset.
    #[must_use]
    pub fn new() -> Self {
        let mut vars = std::env::vars().collect::<BTreeMap<_, _>>();
        Self::set_simulator_defaults(&mut vars);

        Self {
            vars: Arc::new(RwLock::new(vars)),
        }
    }

    /// Creates a simulator environment with no variables at all
    #[must_use]
    pub fn empty() -> Self {
        Self {
            vars: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Creates a simulator environment holding exactly `vars`
    #[must_use]
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Arc::new(RwLock::new(
                vars.into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            )),
        }
    }

    pub fn set_var(&self, name: &str, value: &str) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove_var(&self, name: &str) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    pub fn clear(&self) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Reloads the process environment and re-applies the simulator defaults
    pub fn reset(&self) {
        let mut vars = self.vars.write().unwrap_or_else(PoisonError::into_inner);
        vars.clear();
        vars.extend(std::env::vars());
        Self::set_simulator_defaults(&mut vars);
    }

    fn set_simulator_defaults(vars: &mut BTreeMap<String, String>) {
        // Simulations never reach out to a remote backend unless asked to.
        vars.entry("STRATA_DEPLOYMENT".to_string())
            .or_insert_with(|| "development".to_string());
        vars.entry("STRATA_STORAGE_MODE".to_string())
            .or_insert_with(|| "in_memory".to_string());
        vars.entry("STRATA_FALLBACK_MUTATIONS".to_string())
            .or_insert_with(|| "echo".to_string());

        log::debug!(
            "Set simulator environment defaults: {} variables",
            vars.len()
        );
    }
}

impl Default for SimulatorEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvProvider for SimulatorEnv {
    fn var(&self, name: &str) -> Result<String> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| EnvError::NotFound(name.to_string()))
    }

    fn vars(&self) -> BTreeMap<String, String> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn new_fills_in_defaults() {
        let env = SimulatorEnv::new();

        assert!(env.var_exists("STRATA_STORAGE_MODE"));
        assert!(env.var_exists("STRATA_DEPLOYMENT"));
    }

    #[test_log::test]
    fn set_remove_and_clear() {
        let env = SimulatorEnv::empty();

        env.set_var("A", "1");
        env.set_var("B", "2");
        assert_eq!(env.var("A").unwrap(), "1");

        env.remove_var("A");
        assert!(matches!(env.var("A"), Err(EnvError::NotFound(name)) if name == "A"));

        env.clear();
        assert!(env.vars().is_empty());
    }

    #[test_log::test]
    fn reset_restores_defaults() {
        let env = SimulatorEnv::empty();
        env.set_var("STRATA_STORAGE_MODE", "remote");

        env.reset();

        assert!(env.var_exists("STRATA_DEPLOYMENT"));
        assert!(env.var_exists("STRATA_FALLBACK_MUTATIONS"));
    }

    #[test_log::test]
    fn clones_share_the_same_variables() {
        let env = SimulatorEnv::empty();
        let other = env.clone();

        other.set_var("SHARED", "yes");

        assert_eq!(env.var("SHARED").unwrap(), "yes");
    }
}
