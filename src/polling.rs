//! Polling fallback driver.
//!
//! While the realtime channel is unusable, a binder keeps its view fresh by
//! invalidating its query on a fixed interval, the same call the realtime
//! path would have made on an accepted event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cache::QueryInvalidator;
use crate::models::QueryKey;

/// Default polling interval (30s).
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(30);

/// Per-binder polling timer. At most one timer runs at a time.
///
/// The timer task is aborted on `stop()` and on drop, so a binder that goes
/// away never leaves a timer behind.
pub struct PollingFallback {
    key: QueryKey,
    invalidator: Arc<dyn QueryInvalidator>,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PollingFallback {
    pub fn new(key: QueryKey, invalidator: Arc<dyn QueryInvalidator>) -> Self {
        Self {
            key,
            invalidator,
            active: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Start polling every `interval`. Returns `false` if already running.
    ///
    /// The first invalidation happens one full interval after start.
    pub fn start(&mut self, interval: Duration) -> bool {
        if self.is_active() {
            return false;
        }
        let interval = if interval.is_zero() {
            DEFAULT_POLLING_INTERVAL
        } else {
            interval
        };

        log::info!(
            "[campus-link] Polling {} every {}ms while realtime is unavailable",
            self.key,
            interval.as_millis()
        );

        let key = self.key.clone();
        let invalidator = Arc::clone(&self.invalidator);
        self.active.store(true, Ordering::SeqCst);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                log::debug!("[campus-link] Polling tick for {}", key);
                invalidator.invalidate(&key);
            }
        }));
        true
    }

    /// Stop polling. Returns `false` if it was not running.
    pub fn stop(&mut self) -> bool {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if was_active {
            log::info!("[campus-link] Stopped polling {}", self.key);
        }
        was_active
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Shared view of the running flag, readable from other tasks.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.active.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for PollingFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingFallback")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}
