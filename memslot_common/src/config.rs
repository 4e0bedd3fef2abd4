//! Configuration loading traits and types.
//!
//! Every memslot application reads one TOML file. The file embeds a
//! `[shared]` table ([`SharedConfig`]) next to its own tables, and the whole
//! document is loaded through [`ConfigLoader`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use memslot_common::config::{ConfigError, ConfigLoader, SharedConfig, Validate};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct DriverConfig {
//!     shared: SharedConfig,
//!     depth: usize,
//! }
//!
//! impl Validate for DriverConfig {
//!     fn validate(&self) -> Result<(), ConfigError> {
//!         self.shared.validate()
//!     }
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = DriverConfig::load_validated(Path::new("driver.toml"))?;
//!     println!("{} with depth {}", config.shared.service_name, config.depth);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::Level;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// The file could not be read or is not valid TOML for the target type.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Lowercase in TOML (`log_level = "debug"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-transfer events from the pointer core.
    Trace,
    /// Discarded images and per-worker progress.
    Debug,
    /// Run summaries.
    #[default]
    Info,
    /// Recoverable anomalies.
    Warn,
    /// Failed runs.
    Error,
}

impl LogLevel {
    /// Matching `tracing` level.
    pub const fn as_tracing(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Level after a `--verbose` flag: at least `Debug`.
    pub fn verbose(self) -> Self {
        self.min(LogLevel::Debug)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Common configuration fields shared across all memslot applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "memslot-relay-01"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier, attached to log output.
    pub service_name: String,
}

impl SharedConfig {
    /// Config for `service_name` at the default log level.
    pub fn named(service_name: impl Into<String>) -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: service_name.into(),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` if `service_name` is empty or blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Semantic checks run after a configuration has been parsed.
pub trait Validate {
    /// Check cross-field constraints the TOML grammar cannot express.
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Loads configuration from TOML files.
///
/// Blanket-implemented for every `DeserializeOwned` type.
///
/// # Contract
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ParseError` if it cannot be read or parsed
/// - `ConfigError::ValidationError` from [`ConfigLoader::load_validated`]
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(format!("{}: {e}", path.display()))
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// [`load`](ConfigLoader::load), then [`Validate::validate`].
    fn load_validated(path: &Path) -> Result<Self, ConfigError>
    where
        Self: Validate,
    {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
