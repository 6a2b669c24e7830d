//! Subscriber bookkeeping and fan-out.
//!
//! A monitor owns one registry holding its weak delegate slot, its weak
//! listener set, and the optional status-changed closure. The registry never
//! keeps a subscriber alive: listeners and the delegate are stored as
//! [`Weak`] references, and entries whose subscriber has been dropped are
//! pruned lazily on the next dispatch. Mutations may come from any thread;
//! dispatch iterates a snapshot taken under the lock so a subscriber that
//! mutates the registry from inside its own callback cannot deadlock.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use log::error;
use parking_lot::Mutex;

use crate::broadcast;
use crate::monitor::Reachability;
use crate::status::Status;

/// Notification contract for weakly held subscribers and the delegate.
pub trait ReachabilityListener: Send + Sync {
    /// Called on the monitor's dispatch queue after each status change.
    fn reachability_changed(&self, monitor: &Reachability, status: Status, previous: Status);
}

/// Signature of the optional status-changed closure.
pub type StatusChangedHandler = dyn Fn(&Reachability, Status, Status) + Send + Sync;

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    delegate: Option<Weak<dyn ReachabilityListener>>,
    listeners: Vec<Weak<dyn ReachabilityListener>>,
    handler: Option<Arc<StatusChangedHandler>>,
}

// Identity is the subscriber allocation, compared as thin pointers so the
// vtable half of the fat pointer cannot split identical subscribers.
fn same_subscriber(
    weak: &Weak<dyn ReachabilityListener>,
    listener: &Arc<dyn ReachabilityListener>,
) -> bool {
    weak.as_ptr() as *const () == Arc::as_ptr(listener) as *const ()
}

impl SubscriberRegistry {
    /// Adds a weakly held listener. No-op if the same subscriber is already
    /// registered.
    pub(crate) fn add_listener(&self, listener: &Arc<dyn ReachabilityListener>) {
        let mut state = self.state.lock();
        if state.listeners.iter().any(|weak| same_subscriber(weak, listener)) {
            return;
        }
        state.listeners.push(Arc::downgrade(listener));
    }

    /// Removes a listener if present; no-op otherwise.
    pub(crate) fn remove_listener(&self, listener: &Arc<dyn ReachabilityListener>) {
        self.state
            .lock()
            .listeners
            .retain(|weak| !same_subscriber(weak, listener));
    }

    /// Snapshot of the listeners that are still alive.
    pub(crate) fn listeners(&self) -> Vec<Arc<dyn ReachabilityListener>> {
        self.state
            .lock()
            .listeners
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Replaces the single weak delegate slot.
    pub(crate) fn set_delegate(&self, delegate: Option<&Arc<dyn ReachabilityListener>>) {
        self.state.lock().delegate = delegate.map(Arc::downgrade);
    }

    pub(crate) fn delegate(&self) -> Option<Arc<dyn ReachabilityListener>> {
        self.state.lock().delegate.as_ref().and_then(Weak::upgrade)
    }

    /// Replaces the status-changed closure. Last write wins for the next
    /// dispatch; an in-flight dispatch keeps the snapshot it already took.
    pub(crate) fn set_handler(&self, handler: Option<Arc<StatusChangedHandler>>) {
        self.state.lock().handler = handler;
    }

    /// Fans a status change out to every live subscriber, pruning dead
    /// listener entries along the way.
    ///
    /// Runs on the monitor's dispatch queue, never concurrently with itself
    /// for the same monitor. A panicking subscriber is isolated and logged.
    pub(crate) fn dispatch(
        &self,
        monitor: &Reachability,
        status: Status,
        previous: Status,
        broadcasts: bool,
    ) {
        let (live, delegate, handler) = {
            let mut state = self.state.lock();
            let mut live = Vec::with_capacity(state.listeners.len());
            state.listeners.retain(|weak| match weak.upgrade() {
                Some(listener) => {
                    live.push(listener);
                    true
                }
                // Subscriber was dropped without remove_listener; prune it.
                None => false,
            });
            let delegate = state.delegate.as_ref().and_then(Weak::upgrade);
            (live, delegate, state.handler.clone())
        };

        for listener in &live {
            isolated("listener", || {
                listener.reachability_changed(monitor, status, previous)
            });
        }
        if let Some(delegate) = delegate {
            isolated("delegate", || {
                delegate.reachability_changed(monitor, status, previous)
            });
        }
        if let Some(handler) = handler {
            isolated("status handler", || handler(monitor, status, previous));
        }
        if broadcasts {
            isolated("broadcast", || {
                broadcast::post(broadcast::STATUS_CHANGED, monitor)
            });
        }
    }
}

fn isolated(kind: &str, notify: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(notify)).is_err() {
        error!("reachability {} panicked during status dispatch", kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(Status, Status)>>,
    }

    impl ReachabilityListener for Recorder {
        fn reachability_changed(&self, _monitor: &Reachability, status: Status, previous: Status) {
            self.events.lock().push((status, previous));
        }
    }

    struct Panicker;

    impl ReachabilityListener for Panicker {
        fn reachability_changed(&self, _monitor: &Reachability, _status: Status, _previous: Status) {
            panic!("subscriber failure");
        }
    }

    fn as_dyn(listener: &Arc<Recorder>) -> Arc<dyn ReachabilityListener> {
        Arc::clone(listener) as Arc<dyn ReachabilityListener>
    }

    #[test]
    fn add_listener_is_identity_deduplicated() {
        let registry = SubscriberRegistry::default();
        let listener = Arc::new(Recorder::default());
        registry.add_listener(&as_dyn(&listener));
        registry.add_listener(&as_dyn(&listener));
        assert_eq!(registry.listeners().len(), 1);

        let other = Arc::new(Recorder::default());
        registry.add_listener(&as_dyn(&other));
        assert_eq!(registry.listeners().len(), 2);
    }

    #[test]
    fn remove_listener_is_a_no_op_when_absent() {
        let registry = SubscriberRegistry::default();
        let listener = Arc::new(Recorder::default());
        registry.remove_listener(&as_dyn(&listener));

        registry.add_listener(&as_dyn(&listener));
        registry.remove_listener(&as_dyn(&listener));
        assert!(registry.listeners().is_empty());
    }

    #[test]
    fn dispatch_prunes_dropped_listeners() {
        let registry = SubscriberRegistry::default();
        let monitor = Reachability::for_internet_connection();
        let kept = Arc::new(Recorder::default());
        let dropped = Arc::new(Recorder::default());
        registry.add_listener(&as_dyn(&kept));
        registry.add_listener(&as_dyn(&dropped));
        drop(dropped);

        registry.dispatch(&monitor, Status::Available, Status::NotAvailable, false);
        assert_eq!(registry.listeners().len(), 1);
        assert_eq!(
            *kept.events.lock(),
            vec![(Status::Available, Status::NotAvailable)]
        );
    }

    #[test]
    fn panicking_subscriber_does_not_stop_fanout() {
        let registry = SubscriberRegistry::default();
        let monitor = Reachability::for_internet_connection();
        let panicker: Arc<dyn ReachabilityListener> = Arc::new(Panicker);
        let recorder = Arc::new(Recorder::default());
        registry.add_listener(&panicker);
        registry.set_delegate(Some(&as_dyn(&recorder)));

        registry.dispatch(
            &monitor,
            Status::AvailableOnCellular,
            Status::Available,
            false,
        );
        assert_eq!(
            *recorder.events.lock(),
            vec![(Status::AvailableOnCellular, Status::Available)]
        );
    }

    #[test]
    fn delegate_slot_is_replaced_not_accumulated() {
        let registry = SubscriberRegistry::default();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        registry.set_delegate(Some(&as_dyn(&first)));
        registry.set_delegate(Some(&as_dyn(&second)));

        let monitor = Reachability::for_internet_connection();
        registry.dispatch(&monitor, Status::Available, Status::NotAvailable, false);
        assert!(first.events.lock().is_empty());
        assert_eq!(second.events.lock().len(), 1);

        registry.set_delegate(None);
        assert!(registry.delegate().is_none());
    }
}
