//! Configuration loading using Figment.
//!
//! Settings are read from a TOML file and then overridden by environment
//! variables prefixed with `RUST_SCAN_`. Nested keys are separated with a
//! double underscore:
//!
//! ```text
//! RUST_SCAN_APPLICATION__LOG_LEVEL=debug
//! RUST_SCAN_WORKER__CHUNK_SIZE=131072
//! ```
//!
//! Every section has defaults, so a missing file yields a usable
//! configuration.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/rust_scan.toml";

/// Failure to load or validate settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be read or parsed
    #[error("Configuration load error: {0}")]
    Load(#[from] figment::Error),
    /// Settings were read but are not acceptable
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Application identity and logging
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Scan worker tuning
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Presentation limits
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Application identity and logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name, used in logs
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// Scan worker tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Capacity of the caller → worker command queue
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Maximum bytes requested from the adapter per chunk read
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command_capacity: default_command_capacity(),
            event_capacity: default_event_capacity(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Presentation limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Enumerated-set constraint text lists at most this many values
    #[serde(default = "default_max_listed_values")]
    pub max_listed_values: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_listed_values: default_max_listed_values(),
        }
    }
}

fn default_name() -> String {
    "rust_scan".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_command_capacity() -> usize {
    32
}

fn default_event_capacity() -> usize {
    256
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_max_listed_values() -> usize {
    10
}

impl Settings {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment, then validate.
    ///
    /// A missing file is not an error; defaults fill every field.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RUST_SCAN_").split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check values that deserialize fine but can't be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.worker.command_capacity == 0 || self.worker.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "worker channel capacities must be greater than 0".to_string(),
            ));
        }

        if self.worker.chunk_size == 0 {
            return Err(ConfigError::Validation(
                "worker.chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.display.max_listed_values == 0 {
            return Err(ConfigError::Validation(
                "display.max_listed_values must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
