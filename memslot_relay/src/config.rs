//! Relay configuration.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "info"
//! service_name = "memslot-relay-01"
//!
//! [relay]
//! messages = 1000
//! mode = "both"
//! consumers = 2
//! ```

use clap::ValueEnum;
use memslot::config::{ConfigError, SharedConfig, Validate};
use memslot::consts::{DEFAULT_MESSAGES, DEFAULT_SERVICE_NAME, MAX_CONSUMERS};
use serde::{Deserialize, Serialize};

/// Which pointer family a run moves through the slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// `ExclusivePtr` images, one fresh payload per message.
    Exclusive,
    /// `SharedPtr` images of a single payload.
    Shared,
    /// Exclusive run followed by a shared run.
    #[default]
    Both,
}

impl RelayMode {
    /// Whether the exclusive run is part of this mode.
    pub fn runs_exclusive(self) -> bool {
        matches!(self, RelayMode::Exclusive | RelayMode::Both)
    }

    /// Whether the shared run is part of this mode.
    pub fn runs_shared(self) -> bool {
        matches!(self, RelayMode::Shared | RelayMode::Both)
    }
}

fn default_messages() -> u32 {
    DEFAULT_MESSAGES
}

fn default_consumers() -> u8 {
    1
}

/// The `[relay]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySettings {
    /// Messages each producer sends per mode.
    #[serde(default = "default_messages")]
    pub messages: u32,

    /// Pointer families to exercise.
    #[serde(default)]
    pub mode: RelayMode,

    /// Producer/consumer pairs, each with its own queue.
    #[serde(default = "default_consumers")]
    pub consumers: u8,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            messages: default_messages(),
            mode: RelayMode::default(),
            consumers: default_consumers(),
        }
    }
}

/// Complete relay configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Log level and service name.
    pub shared: SharedConfig,

    /// Run parameters; all fields have defaults.
    #[serde(default)]
    pub relay: RelaySettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::named(DEFAULT_SERVICE_NAME),
            relay: RelaySettings::default(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOverrides {
    /// Replaces `relay.messages`.
    pub messages: Option<u32>,
    /// Replaces `relay.mode`.
    pub mode: Option<RelayMode>,
    /// Replaces `relay.consumers`.
    pub consumers: Option<u8>,
}

impl RelayConfig {
    /// Apply command-line overrides. Call [`Validate::validate`] afterwards.
    pub fn apply(&mut self, overrides: RelayOverrides) {
        if let Some(messages) = overrides.messages {
            self.relay.messages = messages;
        }
        if let Some(mode) = overrides.mode {
            self.relay.mode = mode;
        }
        if let Some(consumers) = overrides.consumers {
            self.relay.consumers = consumers;
        }
    }
}

impl Validate for RelayConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.relay.messages == 0 {
            return Err(ConfigError::ValidationError(
                "relay.messages must be greater than 0".to_string(),
            ));
        }
        if self.relay.consumers == 0 || self.relay.consumers > MAX_CONSUMERS {
            return Err(ConfigError::ValidationError(format!(
                "relay.consumers must be in 1..={MAX_CONSUMERS}, got {}",
                self.relay.consumers
            )));
        }
        Ok(())
    }
}
