use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Hook invoked when the health monitor optimistically leaves fallback mode.
pub type RecoveryCallback = Arc<dyn Fn() + Send + Sync>;

/// Registry of recovery callbacks, notified in registration order.
#[derive(Default)]
pub(crate) struct RecoveryRegistry {
    next_id: AtomicU64,
    callbacks: Mutex<BTreeMap<u64, RecoveryCallback>>,
}

impl RecoveryRegistry {
    pub(crate) fn register(self: &Arc<Self>, callback: RecoveryCallback) -> RecoveryHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, callback);
        RecoveryHandle {
            id,
            registry: Arc::downgrade(self),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Invoke every callback once. A panicking callback is logged and does
    /// not prevent the others from running.
    pub(crate) fn notify_all(&self) -> usize {
        // Snapshot so callbacks may (un)register without deadlocking.
        let callbacks: Vec<(u64, RecoveryCallback)> =
            self.lock().iter().map(|(id, cb)| (*id, cb.clone())).collect();

        for (id, callback) in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                log::warn!("[campus-link] Recovery callback #{} panicked; continuing", id);
            }
        }
        callbacks.len()
    }

    fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, RecoveryCallback>> {
        self.callbacks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Registration of a recovery callback. Dropping the handle unregisters it.
#[must_use = "dropping the handle unregisters the callback"]
pub struct RecoveryHandle {
    id: u64,
    registry: Weak<RecoveryRegistry>,
}

impl RecoveryHandle {
    /// Unregister explicitly. Returns `false` if it was already gone.
    pub fn unregister(mut self) -> bool {
        self.detach()
    }

    fn detach(&mut self) -> bool {
        match std::mem::take(&mut self.registry).upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}

impl Drop for RecoveryHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for RecoveryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_calls_each_once() {
        let registry = Arc::new(RecoveryRegistry::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<RecoveryHandle> = (0..3)
            .map(|_| {
                let calls = calls.clone();
                registry.register(Arc::new(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                }))
            })
            .collect();

        assert_eq!(registry.notify_all(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        drop(handles);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_panicking_callback_isolated() {
        let registry = Arc::new(RecoveryRegistry::default());
        let reached = Arc::new(AtomicUsize::new(0));
        let r = reached.clone();

        let _bad = registry.register(Arc::new(|| panic!("view failed to resubscribe")));
        let _good = registry.register(Arc::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));

        registry.notify_all();
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_is_one_shot() {
        let registry = Arc::new(RecoveryRegistry::default());
        let handle = registry.register(Arc::new(|| {}));
        assert_eq!(registry.len(), 1);
        assert!(handle.unregister());
        assert_eq!(registry.len(), 0);
    }
}
