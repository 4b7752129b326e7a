//! In-process fan-out of typed events to registered observers.
//!
//! Three instances of [`SubscriptionBus`] exist in a running coordinator —
//! one each for changes, buildset additions and buildset completions — each
//! parameterised over its own event type. Delivery is synchronous and
//! fire-and-forget with respect to the caller of [`SubscriptionBus::deliver`]:
//! observers are invoked in subscription order, an observer panicking does
//! not stop delivery to the rest, and the bus never awaits anything an
//! observer itself chooses to do asynchronously.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy, PartialEq, Eq)]
struct SubscriberId(u64);

struct Slot<T> {
    id: SubscriberId,
    observer: Arc<dyn Fn(&T) + Send + Sync>,
}

struct Inner<T> {
    slots: Mutex<Vec<Slot<T>>>,
    next_id: AtomicU64,
}

impl<T> Inner<T> {
    fn unsubscribe(&self, id: SubscriberId) {
        self.slots.lock().retain(|s| s.id != id);
    }
}

/// A typed, in-process publish point. Cloning a `SubscriptionBus` gives a
/// handle to the same underlying registry (it's an `Arc` internally) — the
/// coordinator keeps one owning instance per bus and hands clones to
/// whichever components need to publish.
pub struct SubscriptionBus<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SubscriptionBus<T> {
    fn clone(&self) -> Self {
        SubscriptionBus {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for SubscriptionBus<T> {
    fn default() -> Self {
        SubscriptionBus {
            inner: Arc::new(Inner {
                slots: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<T> SubscriptionBus<T> {
    /// A bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`. Subsequent deliveries invoke it in the order
    /// subscriptions were made, after any already-registered observer.
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionHandle<T> {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.slots.lock().push(Slot {
            id,
            observer: Arc::new(observer),
        });
        SubscriptionHandle {
            id,
            inner: self.inner.clone(),
        }
    }

    /// Deliver `event` to every currently-subscribed observer, once each, in
    /// subscription order. An observer that panics is caught and logged; it
    /// does not prevent delivery to the remaining observers and does not
    /// unsubscribe it.
    ///
    /// Observers registered or cancelled *during* this call are not affected
    /// by it: we snapshot the subscriber list up front, matching the "only
    /// subsequent deliveries are affected" contract.
    pub fn deliver(&self, event: &T) {
        let snapshot: Vec<Arc<dyn Fn(&T) + Send + Sync>> =
            self.inner.slots.lock().iter().map(|s| s.observer.clone()).collect();
        for observer in snapshot {
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| observer(event))) {
                let message = panic_message(&panic);
                tracing::error!(error = %message, "observer failed while handling bus delivery");
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A token returned by [`SubscriptionBus::subscribe`]. Call [`Self::cancel`]
/// to remove the observer; letting the handle drop leaves the subscription
/// active, matching the explicit-cancellation contract observers rely on
/// elsewhere in this crate (e.g. the reconciler detaching a status target).
pub struct SubscriptionHandle<T> {
    id: SubscriberId,
    inner: Arc<Inner<T>>,
}

impl<T> SubscriptionHandle<T> {
    /// Remove the observer this handle was returned for. Idempotent.
    pub fn cancel(self) {
        self.inner.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delivers_in_subscription_order() {
        let bus: SubscriptionBus<u32> = SubscriptionBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        bus.subscribe(move |_| o1.lock().push(1));
        bus.subscribe(move |_| o2.lock().push(2));
        bus.deliver(&42);
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn each_observer_sees_every_event_once() {
        let bus: SubscriptionBus<u32> = SubscriptionBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        bus.deliver(&1);
        bus.deliver(&2);
        bus.deliver(&3);
        assert_eq!(count.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn cancelled_observer_stops_receiving() {
        let bus: SubscriptionBus<u32> = SubscriptionBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        bus.deliver(&1);
        handle.cancel();
        bus.deliver(&2);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn a_failing_observer_does_not_block_the_rest() {
        let bus: SubscriptionBus<u32> = SubscriptionBus::new();
        let reached = Arc::new(AtomicUsize::new(0));
        let r = reached.clone();
        bus.subscribe(|_| panic!("boom"));
        bus.subscribe(move |_| {
            r.fetch_add(1, Ordering::Relaxed);
        });
        bus.deliver(&1);
        assert_eq!(reached.load(Ordering::Relaxed), 1);
    }
}
