//! Redelivery filter for inbound events.
//!
//! The channel delivers at-least-once, so the same emission can arrive more
//! than once (e.g. after a reconnect). The deduplicator remembers delivered
//! event ids and rejects repeats.
//!
//! The seen-set is bounded: once it grows past its capacity it is cleared
//! wholesale, starting a new deduplication epoch. A duplicate that straddles
//! a clear is delivered again, which only costs a redundant cache refresh:
//! consumers always refetch from the source of truth instead of trusting
//! event payloads.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::models::InboundEvent;

/// Default ceiling on remembered event ids.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// Tracks recently delivered event ids to discard redeliveries.
#[derive(Debug)]
pub struct EventDeduplicator {
    capacity: usize,
    seen: Mutex<HashSet<String>>,
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DEDUP_CAPACITY)
    }
}

impl EventDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            seen: Mutex::new(HashSet::with_capacity(capacity.min(DEFAULT_DEDUP_CAPACITY) + 1)),
        }
    }

    /// Returns `true` if the event should be delivered, `false` if it is a
    /// redelivery within the current epoch.
    ///
    /// Events without an id cannot be recognized as redeliveries and are
    /// always delivered without being recorded.
    pub fn accept(&self, event: &InboundEvent) -> bool {
        if event.id.is_empty() {
            return true;
        }

        let mut seen = self.lock();
        if seen.contains(&event.id) {
            log::debug!("[campus-link] Dropping duplicate event {}", event.id);
            return false;
        }

        seen.insert(event.id.clone());
        if seen.len() > self.capacity {
            log::debug!(
                "[campus-link] Seen-event set exceeded {} ids, starting a new epoch",
                self.capacity
            );
            seen.clear();
        }
        true
    }

    /// Number of ids remembered in the current epoch.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every id (test teardown).
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> InboundEvent {
        InboundEvent {
            id: id.to_string(),
            event_type: "table_change".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_rejected_within_epoch() {
        let dedup = EventDeduplicator::new();
        assert!(dedup.accept(&event("a")));
        assert!(!dedup.accept(&event("a")));
        assert!(dedup.accept(&event("b")));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_overflow_clears_whole_set() {
        let dedup = EventDeduplicator::new();
        for i in 0..1000 {
            assert!(dedup.accept(&event(&format!("evt-{}", i))));
        }
        assert_eq!(dedup.len(), 1000, "exactly at capacity is kept");

        // The 1001st unique id pushes the set past the ceiling.
        assert!(dedup.accept(&event("evt-1000")));
        assert_eq!(dedup.len(), 0);

        assert!(dedup.accept(&event("fresh")));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn test_duplicate_after_clear_is_redelivered() {
        let dedup = EventDeduplicator::with_capacity(2);
        assert!(dedup.accept(&event("x")));
        assert!(dedup.accept(&event("y")));
        assert!(dedup.accept(&event("z"))); // clears
        assert!(dedup.accept(&event("x")), "new epoch forgets old ids");
    }

    #[test]
    fn test_events_without_id_always_delivered() {
        let dedup = EventDeduplicator::new();
        assert!(dedup.accept(&event("")));
        assert!(dedup.accept(&event("")));
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_clear() {
        let dedup = EventDeduplicator::new();
        dedup.accept(&event("a"));
        dedup.clear();
        assert!(dedup.accept(&event("a")));
    }
}
