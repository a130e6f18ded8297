//! Configuration for the realtime layer.
//!
//! Every section is serde-defaulted, so a config file only needs to name the
//! values it changes:
//!
//! ```toml
//! server_url = "https://school.example.org"
//! polling_interval_ms = 15000
//!
//! [connection]
//! max_reconnect_attempts = 8
//!
//! [health]
//! recovery_cooldown_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::dedup::DEFAULT_DEDUP_CAPACITY;
use crate::error::{CampusLinkError, Result};
use crate::models::ConnectionOptions;

/// Thresholds and timers of the health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive errors that switch the client into polling fallback
    /// Default: 3
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Quiet period after the last error before a recovery attempt
    /// Default: 60000ms
    #[serde(default = "default_recovery_cooldown_ms")]
    pub recovery_cooldown_ms: u64,

    /// Interval of the recovery scheduler
    /// Default: 10000ms
    #[serde(default = "default_recovery_check_interval_ms")]
    pub recovery_check_interval_ms: u64,

    /// Quiet period after which a success decays the error count by one
    /// Default: 60000ms
    #[serde(default = "default_error_decay_after_ms")]
    pub error_decay_after_ms: u64,

    /// Warning diagnostics allowed per window
    /// Default: 5
    #[serde(default = "default_diagnostic_limit")]
    pub diagnostic_limit: u32,

    /// Length of the diagnostic rate-limit window
    /// Default: 3600000ms (1 hour)
    #[serde(default = "default_diagnostic_window_ms")]
    pub diagnostic_window_ms: u64,
}

fn default_error_threshold() -> u32 {
    3
}

fn default_recovery_cooldown_ms() -> u64 {
    60_000
}

fn default_recovery_check_interval_ms() -> u64 {
    10_000
}

fn default_error_decay_after_ms() -> u64 {
    60_000
}

fn default_diagnostic_limit() -> u32 {
    5
}

fn default_diagnostic_window_ms() -> u64 {
    3_600_000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            recovery_cooldown_ms: default_recovery_cooldown_ms(),
            recovery_check_interval_ms: default_recovery_check_interval_ms(),
            error_decay_after_ms: default_error_decay_after_ms(),
            diagnostic_limit: default_diagnostic_limit(),
            diagnostic_window_ms: default_diagnostic_window_ms(),
        }
    }
}

impl HealthConfig {
    pub fn recovery_cooldown(&self) -> Duration {
        Duration::from_millis(self.recovery_cooldown_ms)
    }

    pub fn recovery_check_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_check_interval_ms)
    }

    pub fn error_decay_after(&self) -> Duration {
        Duration::from_millis(self.error_decay_after_ms)
    }

    pub fn diagnostic_window(&self) -> Duration {
        Duration::from_millis(self.diagnostic_window_ms)
    }
}

/// Top-level configuration of a [`RealtimeContext`](crate::RealtimeContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Base URL of the API server (http, https, ws or wss)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default)]
    pub connection: ConnectionOptions,

    #[serde(default)]
    pub health: HealthConfig,

    /// Interval of binder polling while the channel is unusable
    /// Default: 30000ms
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// Ceiling of the seen-event set
    /// Default: 1000
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_polling_interval_ms() -> u64 {
    30_000
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            connection: ConnectionOptions::default(),
            health: HealthConfig::default(),
            polling_interval_ms: default_polling_interval_ms(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment overrides are applied separately via `apply_env_overrides()`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CampusLinkError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RealtimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override selected values from `CAMPUS_LINK_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CAMPUS_LINK_SERVER_URL") {
            self.server_url = url;
        }
        if let Ok(path) = std::env::var("CAMPUS_LINK_WS_PATH") {
            self.connection.ws_path = path;
        }
        if let Ok(raw) = std::env::var("CAMPUS_LINK_POLLING_INTERVAL_MS") {
            self.polling_interval_ms = raw.trim().parse().map_err(|e| {
                CampusLinkError::ConfigurationError(format!(
                    "Invalid CAMPUS_LINK_POLLING_INTERVAL_MS '{}': {}",
                    raw, e
                ))
            })?;
        }
        self.validate()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(self.server_url.trim()).map_err(|e| {
            CampusLinkError::ConfigurationError(format!(
                "Invalid server_url '{}': {}",
                self.server_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(CampusLinkError::ConfigurationError(format!(
                "Unsupported server_url scheme '{}'; expected http(s) or ws(s)",
                url.scheme()
            )));
        }

        if self.health.error_threshold == 0 {
            return Err(CampusLinkError::ConfigurationError(
                "health.error_threshold must be at least 1".to_string(),
            ));
        }
        if self.health.recovery_check_interval_ms == 0 {
            return Err(CampusLinkError::ConfigurationError(
                "health.recovery_check_interval_ms cannot be 0".to_string(),
            ));
        }
        if self.polling_interval_ms == 0 {
            return Err(CampusLinkError::ConfigurationError(
                "polling_interval_ms cannot be 0".to_string(),
            ));
        }
        if self.dedup_capacity == 0 {
            return Err(CampusLinkError::ConfigurationError(
                "dedup_capacity cannot be 0".to_string(),
            ));
        }
        if self.connection.max_reconnect_attempts == 0 {
            return Err(CampusLinkError::ConfigurationError(
                "connection.max_reconnect_attempts must be at least 1".to_string(),
            ));
        }
        if self.connection.reconnect_delay_ms > self.connection.max_reconnect_delay_ms {
            return Err(CampusLinkError::ConfigurationError(format!(
                "connection.reconnect_delay_ms ({}) exceeds max_reconnect_delay_ms ({})",
                self.connection.reconnect_delay_ms, self.connection.max_reconnect_delay_ms
            )));
        }

        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}
