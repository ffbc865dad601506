//! Typed publish/subscribe shared by the config store, model registry and
//! prompt engine.
//!
//! Listeners run sequentially on the notifying thread, in subscription order.
//! A listener that panics is logged and skipped; the rest still run.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`ChangeNotifier::subscribe`]; pass it back to
/// [`ChangeNotifier::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

pub struct ChangeNotifier<E> {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<SubscriptionId, Listener<E>>>,
}

impl<E> Default for ChangeNotifier<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<E> ChangeNotifier<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));
        id
    }

    /// Returns `false` when the id was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn notify(&self, event: &E) {
        // Snapshot first so listeners may (un)subscribe or call back into the
        // owning component without deadlocking.
        let listeners: Vec<(SubscriptionId, Listener<E>)> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        for (id, listener) in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(subscription = id.0, "Change listener panicked; continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn listeners_run_in_order_and_survive_a_panic() {
        let notifier: ChangeNotifier<u32> = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        notifier.subscribe(move |e| first.lock().unwrap().push(("first", *e)));
        notifier.subscribe(|_| panic!("listener blew up"));
        let last = Arc::clone(&seen);
        notifier.subscribe(move |e| last.lock().unwrap().push(("last", *e)));

        notifier.notify(&7);

        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("last", 7)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let notifier: ChangeNotifier<()> = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(&());
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.notify(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.listener_count(), 0);
    }
}
