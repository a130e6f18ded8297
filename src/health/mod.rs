//! Channel health monitor.
//!
//! A small state machine fed by connection outcomes:
//!
//! ```text
//! HEALTHY ──error──▶ DEGRADED(n) ──n ≥ threshold──▶ FALLBACK
//!    ▲                    │                            │
//!    └─────success────────┘        cooldown elapsed    ▼
//!    ▲                                             RECOVERING
//!    └──────────────success / scheduler tick ──────────┘
//! ```
//!
//! While in fallback, binders poll instead of relying on pushed events. The
//! recovery scheduler leaves fallback optimistically once the channel has
//! been quiet long enough and asks every registered binder to resubscribe; if
//! that fails, the next `record_error` puts the monitor straight back into
//! fallback.

mod diagnostics;
mod recovery;
mod status;

pub use recovery::{RecoveryCallback, RecoveryHandle};
pub use status::{FailureKind, HealthState, HealthStatus};

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::HealthConfig;
use diagnostics::DiagnosticLimiter;
use recovery::RecoveryRegistry;

/// Tracks channel failures and decides when to fall back to polling.
///
/// All mutation goes through the named `record_*` / `check_recovery` /
/// `reset` methods; readers take snapshots via [`status`](Self::status).
pub struct HealthMonitor {
    config: HealthConfig,
    status: Mutex<HealthStatus>,
    diagnostics: Mutex<DiagnosticLimiter>,
    callbacks: Arc<RecoveryRegistry>,
    fallback_tx: watch::Sender<bool>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        let (fallback_tx, _) = watch::channel(false);
        let diagnostics =
            DiagnosticLimiter::new(config.diagnostic_limit, config.diagnostic_window());
        Self {
            config,
            status: Mutex::new(HealthStatus::default()),
            diagnostics: Mutex::new(diagnostics),
            callbacks: Arc::new(RecoveryRegistry::default()),
            fallback_tx,
            scheduler: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Record a failed connection attempt or channel error.
    pub fn record_error(&self, error: &str) {
        let now = Instant::now();
        let entered_fallback = {
            let mut status = self.lock_status();
            status.consecutive_errors = status.consecutive_errors.saturating_add(1);
            status.failed_connections += 1;
            status.total_connections += 1;
            status.last_error_at = Some(now);
            status.recovering = false;

            log::debug!(
                "[campus-link] Channel error #{}: {}",
                status.consecutive_errors,
                error
            );

            if status.consecutive_errors >= self.config.error_threshold && !status.in_fallback {
                let kind = FailureKind::classify(error);
                status.in_fallback = true;
                status.connected = false;
                status.fallback_cause = Some(kind);
                Some((kind, status.consecutive_errors))
            } else {
                None
            }
        };

        if let Some((kind, errors)) = entered_fallback {
            self.fallback_tx.send_replace(true);
            if kind.is_limit() {
                self.diagnostic(
                    log::Level::Error,
                    format_args!(
                        "Realtime server rejected connections ({}), switching to polling after {} errors: {}",
                        kind, errors, error
                    ),
                );
            } else {
                self.diagnostic(
                    log::Level::Warn,
                    format_args!(
                        "Realtime channel unusable after {} errors, switching to polling: {}",
                        errors, error
                    ),
                );
            }
        }
    }

    /// Record a successful connection or channel operation.
    pub fn record_success(&self) {
        let now = Instant::now();
        let exited_fallback = {
            let mut status = self.lock_status();
            status.connected = true;
            status.recovering = false;
            status.total_connections += 1;

            if status.in_fallback {
                status.in_fallback = false;
                status.consecutive_errors = 0;
                true
            } else {
                let quiet_long_enough = status
                    .last_error_at
                    .map(|at| now.saturating_duration_since(at) >= self.config.error_decay_after())
                    .unwrap_or(true);
                if quiet_long_enough && status.consecutive_errors > 0 {
                    status.consecutive_errors -= 1;
                }
                false
            }
        };

        if exited_fallback {
            self.fallback_tx.send_replace(false);
            log::info!("[campus-link] Realtime channel recovered, leaving polling fallback");
        }
    }

    /// One tick of the recovery scheduler.
    ///
    /// If in fallback and the last error is at least the cooldown old, leave
    /// fallback, mark the attempt, and notify every recovery callback.
    /// Returns `true` if a recovery attempt was started.
    pub fn check_recovery(&self) -> bool {
        let now = Instant::now();
        {
            let mut status = self.lock_status();
            if !status.in_fallback {
                return false;
            }
            let cooled_down = status
                .last_error_at
                .map(|at| now.saturating_duration_since(at) >= self.config.recovery_cooldown())
                .unwrap_or(true);
            if !cooled_down {
                return false;
            }
            status.in_fallback = false;
            status.consecutive_errors = 0;
            status.recovering = true;
            status.last_recovery_attempt = Some(now);
        }

        self.fallback_tx.send_replace(false);
        log::info!("[campus-link] Attempting realtime recovery");
        let notified = self.callbacks.notify_all();
        log::debug!("[campus-link] Notified {} recovery callback(s)", notified);
        true
    }

    /// Force the monitor back to its initial state and notify recovery callbacks.
    pub fn reset(&self) {
        *self.lock_status() = HealthStatus::default();
        self.lock_diagnostics().reset();
        self.fallback_tx.send_replace(false);
        self.callbacks.notify_all();
    }

    pub fn should_use_fallback(&self) -> bool {
        self.lock_status().in_fallback
    }

    pub fn status(&self) -> HealthStatus {
        self.lock_status().clone()
    }

    pub fn state(&self) -> HealthState {
        self.lock_status().state()
    }

    /// Watch the in-fallback flag.
    pub fn subscribe_fallback(&self) -> watch::Receiver<bool> {
        self.fallback_tx.subscribe()
    }

    /// Register a hook run whenever a recovery attempt starts.
    pub fn register_recovery_callback(
        &self,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> RecoveryHandle {
        self.callbacks.register(Arc::new(callback))
    }

    pub fn recovery_callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Start the repeating recovery check. Idempotent; requires a tokio runtime.
    pub fn start_recovery_scheduler(self: &Arc<Self>) {
        let mut scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if scheduler.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let period = self.config.recovery_check_interval();
        let monitor: Weak<HealthMonitor> = Arc::downgrade(self);
        *scheduler = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match monitor.upgrade() {
                    Some(monitor) => {
                        monitor.check_recovery();
                    },
                    None => return,
                }
            }
        }));
    }

    pub fn stop_recovery_scheduler(&self) {
        let task = self
            .scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn diagnostic(&self, level: log::Level, message: std::fmt::Arguments<'_>) {
        if self.lock_diagnostics().allow(Instant::now()) {
            log::log!(level, "[campus-link] {}", message);
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, HealthStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_diagnostics(&self) -> MutexGuard<'_, DiagnosticLimiter> {
        self.diagnostics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop_recovery_scheduler();
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("recovery_callbacks", &self.recovery_callback_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counter_callback(monitor: &HealthMonitor) -> (Arc<AtomicUsize>, RecoveryHandle) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let handle = monitor.register_recovery_callback(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (calls, handle)
    }

    #[test]
    fn test_initial_state_is_healthy() {
        let monitor = HealthMonitor::default();
        let status = monitor.status();
        assert!(status.connected);
        assert_eq!(status.consecutive_errors, 0);
        assert_eq!(monitor.state(), HealthState::Healthy);
        assert!(!monitor.should_use_fallback());
    }

    #[test]
    fn test_threshold_enters_fallback() {
        let monitor = HealthMonitor::default();

        monitor.record_error("connection refused");
        assert!(!monitor.should_use_fallback());
        assert_eq!(monitor.state(), HealthState::Degraded { consecutive_errors: 1 });

        monitor.record_error("connection refused");
        assert!(!monitor.should_use_fallback());

        monitor.record_error("connection refused");
        assert!(monitor.should_use_fallback());
        let status = monitor.status();
        assert!(!status.connected);
        assert_eq!(status.failed_connections, 3);
        assert_eq!(status.fallback_cause, Some(FailureKind::Generic));
        assert_eq!(monitor.state(), HealthState::Fallback);
    }

    #[test]
    fn test_success_exits_fallback_immediately() {
        let monitor = HealthMonitor::default();
        for _ in 0..3 {
            monitor.record_error("timeout");
        }
        assert!(monitor.should_use_fallback());

        monitor.record_success();
        assert!(!monitor.should_use_fallback());
        assert_eq!(monitor.status().consecutive_errors, 0);
        assert!(monitor.status().connected);
    }

    #[test]
    fn test_limit_errors_classified_but_same_transition() {
        let monitor = HealthMonitor::default();
        for _ in 0..2 {
            monitor.record_error("connection limit exceeded");
            assert!(!monitor.should_use_fallback());
        }
        monitor.record_error("connection limit exceeded");

        assert!(monitor.should_use_fallback());
        assert_eq!(monitor.status().fallback_cause, Some(FailureKind::ConnectionLimit));
    }

    #[test]
    fn test_failure_classification() {
        assert!(FailureKind::classify("Connection LIMIT exceeded").is_limit());
        assert!(FailureKind::classify("server at capacity").is_limit());
        assert!(FailureKind::classify("quota reached").is_limit());
        assert!(FailureKind::classify("Too Many connections").is_limit());
        assert!(!FailureKind::classify("ECONNREFUSED").is_limit());
    }

    #[test]
    fn test_errors_beyond_threshold_do_not_retrigger() {
        let monitor = HealthMonitor::default();
        let mut rx = monitor.subscribe_fallback();
        for _ in 0..3 {
            monitor.record_error("down");
        }
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        monitor.record_error("server at capacity");
        assert!(!rx.has_changed().unwrap());
        assert_eq!(monitor.status().consecutive_errors, 4);
        assert_eq!(monitor.status().fallback_cause, Some(FailureKind::Generic));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_decays_error_count_after_quiet_period() {
        let monitor = HealthMonitor::default();
        monitor.record_error("blip");
        monitor.record_error("blip");

        monitor.record_success();
        assert_eq!(monitor.status().consecutive_errors, 2, "too soon to decay");

        tokio::time::advance(Duration::from_secs(60)).await;
        monitor.record_success();
        assert_eq!(monitor.status().consecutive_errors, 1);
        monitor.record_success();
        assert_eq!(monitor.status().consecutive_errors, 0);
        monitor.record_success();
        assert_eq!(monitor.status().consecutive_errors, 0, "never below zero");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_waits_for_cooldown() {
        let monitor = HealthMonitor::default();
        let (calls, _handle) = counter_callback(&monitor);
        for _ in 0..3 {
            monitor.record_error("down");
        }

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!monitor.check_recovery());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(monitor.check_recovery());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let status = monitor.status();
        assert!(!status.in_fallback);
        assert!(status.recovering);
        assert_eq!(status.consecutive_errors, 0);
        assert!(status.last_recovery_attempt.is_some());
        assert_eq!(monitor.state(), HealthState::Recovering);

        // Nothing left to recover from.
        assert!(!monitor.check_recovery());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_recovery_reenters_fallback_on_next_error() {
        let monitor = HealthMonitor::default();
        for _ in 0..3 {
            monitor.record_error("down");
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(monitor.check_recovery());

        // Error count was reset, so it takes a full threshold again.
        monitor.record_error("still down");
        assert!(!monitor.status().recovering);
        assert!(!monitor.should_use_fallback());
        monitor.record_error("still down");
        monitor.record_error("still down");
        assert!(monitor.should_use_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_triggers_recovery_once() {
        let monitor = Arc::new(HealthMonitor::default());
        let (first, _h1) = counter_callback(&monitor);
        let (second, _h2) = counter_callback(&monitor);
        monitor.start_recovery_scheduler();
        monitor.start_recovery_scheduler();
        assert!(monitor.is_scheduler_running());

        for _ in 0..3 {
            monitor.record_error("down");
        }
        tokio::time::sleep(Duration::from_secs(75)).await;

        assert!(!monitor.should_use_fallback());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        monitor.stop_recovery_scheduler();
        assert!(!monitor.is_scheduler_running());
    }

    #[test]
    fn test_reset_restores_initial_state_and_notifies() {
        let monitor = HealthMonitor::default();
        let (calls, handle) = counter_callback(&monitor);
        for _ in 0..4 {
            monitor.record_error("down");
        }

        monitor.reset();
        assert_eq!(monitor.status(), HealthStatus::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(handle.unregister());
        monitor.reset();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fallback_watch_follows_transitions() {
        let monitor = HealthMonitor::default();
        let rx = monitor.subscribe_fallback();
        assert!(!*rx.borrow());
        for _ in 0..3 {
            monitor.record_error("down");
        }
        assert!(*rx.borrow());
        monitor.record_success();
        assert!(!*rx.borrow());
    }
}
