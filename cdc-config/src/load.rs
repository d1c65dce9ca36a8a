//! Layered configuration loading.
//!
//! Configuration is assembled from an optional `configuration/base.yaml`
//! file overlaid with `APP_`-prefixed environment variables, where `__`
//! separates nested keys (e.g. `APP_SOURCE__POLL_INTERVAL_MS=500`).

use std::path::Path;

use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Directory containing configuration files relative to the application root.
const CONFIGURATION_DIR: &str = "configuration";

/// File stem of the base configuration file.
const BASE_CONFIG_STEM: &str = "base";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
}

/// Loads a configuration value of type `T` from the default location.
///
/// Reads `configuration/base.yaml` relative to the current directory when it
/// exists, then applies environment overrides.
pub fn load_config<T: DeserializeOwned>() -> Result<T, LoadConfigError> {
    load_config_from(Path::new(CONFIGURATION_DIR))
}

/// Loads a configuration value of type `T` from `dir`.
pub fn load_config_from<T: DeserializeOwned>(dir: &Path) -> Result<T, LoadConfigError> {
    let base_file = dir.join(BASE_CONFIG_STEM);

    let settings = Config::builder()
        .add_source(File::from(base_file).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}
