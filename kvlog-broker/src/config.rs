//! Configuration for the log service.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BrokerError, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "KVLOG_CONFIG";

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub allocator: AllocatorConfig,

    #[serde(default)]
    pub poll: PollConfig,
}

/// How the allocator picks its next candidate after losing a compare-and-swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStrategy {
    /// Re-read the counter and retry from its true value.
    #[default]
    Reread,
    /// Advance the candidate by one without reading the store.
    ///
    /// Needs O(k) attempts to get past k concurrent reservations.
    ProbeForward,
}

/// Offset reservation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Compare-and-swap attempts before giving up on a reservation.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first lost compare-and-swap.
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Upper bound on the delay between attempts.
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Growth factor applied to the delay after each lost attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    #[serde(default)]
    pub probe_strategy: ProbeStrategy,
}

fn default_max_attempts() -> u32 {
    64
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_backoff_multiplier() -> u32 {
    2
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            probe_strategy: ProbeStrategy::default(),
        }
    }
}

/// Poll settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Cap on entries returned per topic by one poll. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages_per_topic: Option<usize>,
}

impl BrokerConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| BrokerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BrokerError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loading broker config");
        Self::from_toml_str(&contents)
    }

    /// Load from `$KVLOG_CONFIG`, else the user config file, else defaults.
    ///
    /// An explicit `$KVLOG_CONFIG` must exist; the user config file is optional.
    pub fn load_default() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load(PathBuf::from(path));
        }

        match Self::user_config_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Platform config path, e.g. `~/.config/kvlog/config.toml`.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("kvlog").join("config.toml"))
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BrokerError::Config(e.to_string()))
    }

    /// Reject settings the allocator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.allocator.max_attempts == 0 {
            return Err(BrokerError::Config(
                "allocator.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.allocator.backoff_multiplier == 0 {
            return Err(BrokerError::Config(
                "allocator.backoff_multiplier must be at least 1".to_string(),
            ));
        }
        if self.allocator.initial_backoff > self.allocator.max_backoff {
            return Err(BrokerError::Config(
                "allocator.initial_backoff exceeds allocator.max_backoff".to_string(),
            ));
        }
        if self.poll.max_messages_per_topic == Some(0) {
            return Err(BrokerError::Config(
                "poll.max_messages_per_topic must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the reservation attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.allocator.max_attempts = max_attempts;
        self
    }

    /// Set the backoff curve.
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.allocator.initial_backoff = initial;
        self.allocator.max_backoff = max;
        self
    }

    /// Set the probe strategy.
    #[must_use]
    pub fn with_probe_strategy(mut self, strategy: ProbeStrategy) -> Self {
        self.allocator.probe_strategy = strategy;
        self
    }

    /// Cap entries per topic per poll.
    #[must_use]
    pub fn with_max_messages_per_topic(mut self, max: usize) -> Self {
        self.poll.max_messages_per_topic = Some(max);
        self
    }
}
