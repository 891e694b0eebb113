//! Process-wide registry of event subscribers.
//!
//! The hub maps an event type to the callbacks interested in it and
//! delivers every published payload to all of them. It knows nothing about
//! connectivity; the connection manager is just one publisher.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::{error, trace};

/// Callback invoked with the payload of every matching envelope.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    topics: HashMap<String, Vec<(u64, Callback)>>,
}

/// Fan-out registry shared by every consumer of the stream.
#[derive(Default)]
pub struct SubscriptionHub {
    registry: Mutex<Registry>,
}

impl SubscriptionHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `callback` for `event_type`.
    ///
    /// The returned handle removes exactly this registration when
    /// [`Subscription::unsubscribe`] is called or when it is dropped.
    pub fn subscribe<F>(self: &Arc<Self>, event_type: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut reg = self.registry();
        // Ids are never reused, so a stale handle cannot remove a newer callback.
        reg.next_id += 1;
        let id = reg.next_id;
        reg.topics
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        trace!(event_type, id, "subscriber added");

        Subscription {
            hub: Arc::downgrade(self),
            event_type: event_type.to_string(),
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Delivers `payload` to every callback registered for `event_type`.
    ///
    /// The subscriber set is snapshotted first: callbacks may subscribe or
    /// unsubscribe while being invoked, and a callback added during this
    /// call will only see later payloads. A panicking callback is logged and
    /// does not stop delivery to the rest. Returns the number of callbacks
    /// that completed.
    pub fn publish(&self, event_type: &str, payload: &Value) -> usize {
        let snapshot: Vec<Callback> = match self.registry().topics.get(event_type) {
            Some(subs) => subs.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for cb in snapshot {
            match catch_unwind(AssertUnwindSafe(|| cb(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(event_type, "subscriber panicked during fan-out"),
            }
        }
        delivered
    }

    /// Number of callbacks currently registered for `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.registry().topics.get(event_type).map_or(0, Vec::len)
    }

    fn remove(&self, event_type: &str, id: u64) -> bool {
        let mut reg = self.registry();
        let Some(subs) = reg.topics.get_mut(event_type) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        before != subs.len()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Callbacks never run under this lock, so poisoning cannot leave the map half-updated.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one registration on a [`SubscriptionHub`].
///
/// Dropping the handle unsubscribes, which ties a consumer's registration
/// to its own lifetime on every exit path.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    hub: Weak<SubscriptionHub>,
    event_type: String,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Removes the callback. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(&self.event_type, self.id) {
                trace!(event_type = %self.event_type, id = self.id, "subscriber removed");
            }
        }
    }

    /// Keeps the callback registered for the life of the hub.
    pub fn detach(self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event_type", &self.event_type)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
