#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Log output setup for the strata binaries.
//!
//! Libraries only use the `log` facade. Binaries call [`init`] once at
//! startup.

#[cfg(feature = "macros")]
mod macros;

pub use log;

#[cfg(feature = "free_log")]
pub use free_log_client;

#[cfg(feature = "free_log")]
mod free_log {
    use std::path::Path;

    use free_log_client::FreeLogLayer;
    use thiserror::Error;

    #[cfg(debug_assertions)]
    const DEFAULT_LOG_LEVEL: &str = "strata=trace";
    #[cfg(not(debug_assertions))]
    const DEFAULT_LOG_LEVEL: &str = "strata=info";

    #[derive(Debug, Error)]
    pub enum InitError {
        #[error(transparent)]
        Logs(#[from] free_log_client::LogsInitError),
        #[error(transparent)]
        BuildLogsConfig(#[from] free_log_client::BuildLogsConfigError),
        #[error(transparent)]
        BuildFileWriterConfig(#[from] free_log_client::BuildFileWriterConfigError),
    }

    /// The filter directives from `STRATA_LOG`, then `RUST_LOG`, then the
    /// build-dependent default.
    #[must_use]
    pub fn env_filter() -> String {
        strata_env::var_non_empty("STRATA_LOG")
            .or_else(|| strata_env::var_non_empty("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    /// Installs the global logger, optionally mirroring `debug` and above
    /// into `log_file`.
    ///
    /// # Errors
    ///
    /// * If the file writer cannot be configured
    /// * If the logger was already initialized
    pub fn init(log_file: Option<&Path>) -> Result<FreeLogLayer, InitError> {
        let mut logs_config = free_log_client::LogsConfig::builder();

        if let Some(log_file) = log_file {
            logs_config = logs_config.with_file_writer(
                free_log_client::FileWriterConfig::builder()
                    .file_path(log_file.to_path_buf())
                    .log_level(free_log_client::Level::Debug),
            )?;
        }

        let filter = env_filter();
        let layer = free_log_client::init(logs_config.env_filter(filter.as_str()))?;

        Ok(layer)
    }

}

#[cfg(feature = "free_log")]
pub use free_log::{InitError, env_filter, init};
