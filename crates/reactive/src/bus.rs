//! Process-wide change-notification bus.
//!
//! Decouples store writers from query readers. Delivery is synchronous and
//! in subscription order; the payload is deliberately opaque. The only
//! meaning a [`ChangeEvent`] carries is "re-validate any active subscription".

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// An opaque "something in the store changed" signal.
///
/// An optional hint names the mutation for log output only; subscribers
/// must not branch on it.
#[derive(Debug, Clone, Default)]
pub struct ChangeEvent {
    hint: Option<&'static str>,
}

impl ChangeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a short label for tracing output (e.g. `"bulk_upsert_channels"`).
    pub fn with_hint(hint: &'static str) -> Self {
        Self { hint: Some(hint) }
    }

    pub fn hint(&self) -> Option<&'static str> {
        self.hint
    }
}

type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

// A poisoned registry still holds valid listeners.
fn lock_listeners(listeners: &Mutex<BTreeMap<u64, Listener>>) -> MutexGuard<'_, BTreeMap<u64, Listener>> {
    listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Listener>>,
}

/// Publish/subscribe signal that something in the store changed.
///
/// Subscribers are invoked synchronously from [`publish`](ChangeBus::publish),
/// in call order relative to their own subscription lifetime. No ordering is
/// guaranteed across unrelated subscribers. A subscriber that unsubscribed
/// before delivery may or may not see an in-flight event.
#[derive(Clone, Default)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Dropping the returned [`Subscription`] (or
    /// calling [`Subscription::unsubscribe`]) removes it.
    pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock_listeners(&self.inner.listeners).insert(id, Arc::new(listener));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// The listener table is snapshotted before invocation, so listeners may
    /// publish or (un)subscribe reentrantly without deadlocking.
    pub fn publish(&self, event: &ChangeEvent) {
        let snapshot: Vec<Listener> = lock_listeners(&self.inner.listeners).values().cloned().collect();
        tracing::debug!(hint = event.hint(), subscribers = snapshot.len(), "publishing change event");
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock_listeners(&self.inner.listeners).len()
    }
}

/// Guard tying a listener's lifetime to a value. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    inner: Weak<BusInner>,
}

impl Subscription {
    /// Remove the listener now instead of at drop time.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            lock_listeners(&inner.listeners).remove(&self.id);
        }
    }
}
