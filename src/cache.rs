//! Boundary to the application's query cache.
//!
//! The realtime layer never trusts event payloads as final state; it only
//! tells the cache which entry is stale so the cache can refetch it from the
//! API.

use crate::models::QueryKey;

/// Marks a cached query as stale.
///
/// Called from the binder task and from polling timers, so implementations
/// must be cheap and must not block.
pub trait QueryInvalidator: Send + Sync {
    fn invalidate(&self, key: &QueryKey);
}

impl<F> QueryInvalidator for F
where
    F: Fn(&QueryKey) + Send + Sync,
{
    fn invalidate(&self, key: &QueryKey) {
        self(key)
    }
}

/// Invalidator that drops every request. Used when the embedding
/// application has no cache (e.g. a CLI tailing events).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

impl QueryInvalidator for NoopInvalidator {
    fn invalidate(&self, key: &QueryKey) {
        log::trace!("[campus-link] Invalidation of {} ignored (no cache)", key);
    }
}
