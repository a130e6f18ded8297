use std::time::Duration;
use tokio::time::Instant;

/// Caps warning-level diagnostics during sustained outages.
///
/// At most `limit` emissions per window; the window opens at the first
/// emission after a reset and the count resets once a full window elapsed.
#[derive(Debug, Clone)]
pub(crate) struct DiagnosticLimiter {
    limit: u32,
    window: Duration,
    window_started: Option<Instant>,
    emitted: u32,
}

impl DiagnosticLimiter {
    pub(crate) fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            window_started: None,
            emitted: 0,
        }
    }

    /// Returns `true` if a diagnostic may be emitted now (and counts it).
    pub(crate) fn allow(&mut self, now: Instant) -> bool {
        if let Some(started) = self.window_started {
            if now.saturating_duration_since(started) >= self.window {
                self.window_started = None;
                self.emitted = 0;
            }
        }

        if self.emitted >= self.limit {
            return false;
        }
        if self.window_started.is_none() {
            self.window_started = Some(now);
        }
        self.emitted += 1;
        true
    }

    pub(crate) fn reset(&mut self) {
        self.window_started = None;
        self.emitted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limits_per_window() {
        let mut limiter = DiagnosticLimiter::new(5, Duration::from_secs(3600));
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow(start));
        }
        assert!(!limiter.allow(start + Duration::from_secs(10)));
        assert!(!limiter.allow(start + Duration::from_secs(3599)));

        // A full hour after the first warning the budget is restored.
        assert!(limiter.allow(start + Duration::from_secs(3600)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_measured_from_first_warning_after_reset() {
        let mut limiter = DiagnosticLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.allow(t0));
        assert!(limiter.allow(t0 + Duration::from_secs(30)));
        assert!(!limiter.allow(t0 + Duration::from_secs(59)));

        // Window rolls over; new window starts at t0 + 100s.
        assert!(limiter.allow(t0 + Duration::from_secs(100)));
        assert!(limiter.allow(t0 + Duration::from_secs(130)));
        assert!(!limiter.allow(t0 + Duration::from_secs(150)));
        assert!(limiter.allow(t0 + Duration::from_secs(160)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let mut limiter = DiagnosticLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.allow(now));
        assert!(!limiter.allow(now));
        limiter.reset();
        assert!(limiter.allow(now));
    }
}
