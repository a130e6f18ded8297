use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection-level options for the shared realtime channel.
///
/// These options control:
/// - Automatic reconnection on connection loss
/// - Reconnection timing and the attempt cap
/// - Per-attempt connection timeout
/// - Transport keepalive
///
/// # Example
///
/// ```rust
/// use campus_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_reconnect_delay_ms(500)
///     .with_max_reconnect_attempts(3);
/// assert_eq!(options.reconnect_delay(2).as_millis(), 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection on connection loss
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Delay step in milliseconds between reconnection attempts.
    /// Attempt `n` waits `n * reconnect_delay_ms`, capped at `max_reconnect_delay_ms`.
    /// Default: 1000ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound on the delay between reconnection attempts
    /// Default: 5000ms
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Consecutive failed attempts before the connection gives up.
    /// Also caps the connection manager's attempt counter.
    /// Default: 5
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Upper bound on a single connection attempt
    /// Default: 20000ms
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Send a keepalive ping after this much inbound silence.
    /// Set to `0` to disable. Default: 25000ms
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Drop the connection if nothing arrives this long after a ping.
    /// Set to `0` to disable. Default: 20000ms
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,

    /// Path of the realtime endpoint on the server
    /// Default: "/realtime"
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    5000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_connection_timeout_ms() -> u64 {
    20000
}

fn default_ping_interval_ms() -> u64 {
    25000
}

fn default_pong_timeout_ms() -> u64 {
    20000
}

fn default_ws_path() -> String {
    "/realtime".to_string()
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            connection_timeout_ms: default_connection_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            ws_path: default_ws_path(),
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the delay step between reconnection attempts (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the maximum delay between reconnection attempts (in milliseconds)
    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Set the number of consecutive failed attempts before giving up
    pub fn with_max_reconnect_attempts(mut self, max_attempts: u32) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Set the per-attempt connection timeout (in milliseconds)
    pub fn with_connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    /// Set the keepalive ping interval in milliseconds. `0` disables pings.
    pub fn with_ping_interval_ms(mut self, ms: u64) -> Self {
        self.ping_interval_ms = ms;
        self
    }

    /// Set the pong timeout in milliseconds. `0` disables the check.
    pub fn with_pong_timeout_ms(mut self, ms: u64) -> Self {
        self.pong_timeout_ms = ms;
        self
    }

    /// Set the path of the realtime endpoint
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Delay before reconnection attempt `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let step = self.reconnect_delay_ms.saturating_mul(u64::from(attempt.max(1)));
        Duration::from_millis(step.min(self.max_reconnect_delay_ms))
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}
