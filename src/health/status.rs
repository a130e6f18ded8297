use std::fmt;
use tokio::time::Instant;

/// Coarse classification of the error that tipped the client into fallback.
///
/// Advisory only: it selects the diagnostic severity, never the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Server refused because of connection limits / capacity / quota.
    ConnectionLimit,
    Generic,
}

impl FailureKind {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        const LIMIT_MARKERS: [&str; 4] = ["limit", "capacity", "quota", "too many"];
        if LIMIT_MARKERS.iter().any(|marker| lower.contains(marker)) {
            FailureKind::ConnectionLimit
        } else {
            FailureKind::Generic
        }
    }

    pub fn is_limit(&self) -> bool {
        matches!(self, FailureKind::ConnectionLimit)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ConnectionLimit => write!(f, "connection-limit"),
            FailureKind::Generic => write!(f, "generic"),
        }
    }
}

/// Derived view of [`HealthStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    /// Errors are accumulating but the threshold is not reached yet.
    Degraded { consecutive_errors: u32 },
    Fallback,
    Recovering,
}

/// Snapshot of the health monitor's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub connected: bool,
    pub consecutive_errors: u32,
    pub failed_connections: u64,
    pub total_connections: u64,
    pub last_error_at: Option<Instant>,
    pub in_fallback: bool,
    pub recovering: bool,
    pub last_recovery_attempt: Option<Instant>,
    /// Classification of the error that caused the current/last fallback entry.
    pub fallback_cause: Option<FailureKind>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            connected: true,
            consecutive_errors: 0,
            failed_connections: 0,
            total_connections: 0,
            last_error_at: None,
            in_fallback: false,
            recovering: false,
            last_recovery_attempt: None,
            fallback_cause: None,
        }
    }
}

impl HealthStatus {
    pub fn state(&self) -> HealthState {
        if self.recovering {
            HealthState::Recovering
        } else if self.in_fallback {
            HealthState::Fallback
        } else if self.consecutive_errors > 0 {
            HealthState::Degraded {
                consecutive_errors: self.consecutive_errors,
            }
        } else {
            HealthState::Healthy
        }
    }
}
