//! Process-wide named event bus.
//!
//! Monitors with broadcasting enabled publish a status-changed event here in
//! addition to their direct subscribers. The event carries no payload beyond
//! the originating monitor handle: observers re-read
//! [`Reachability::status`](crate::Reachability::status) themselves, which
//! keeps multiple broadcasting monitors distinguishable. Observing and
//! cancelling have no ordering dependency on monitor lifecycle.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::error;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::monitor::Reachability;

/// Event name posted when a broadcasting monitor observes a status change.
pub const STATUS_CHANGED: &str = "netreach.status-changed";

type Observer = Arc<dyn Fn(&Reachability) + Send + Sync>;

static BUS: Lazy<Mutex<Bus>> = Lazy::new(|| Mutex::new(Bus::default()));

#[derive(Default)]
struct Bus {
    next_id: u64,
    channels: HashMap<String, Vec<(u64, Observer)>>,
}

/// Registration token returned by [`observe`]. Cancels on drop.
#[must_use = "dropping the subscription cancels it"]
pub struct Subscription {
    event: String,
    id: u64,
    active: bool,
}

/// Registers an observer for `event` and returns its cancellation token.
pub fn observe<F>(event: &str, observer: F) -> Subscription
where
    F: Fn(&Reachability) + Send + Sync + 'static,
{
    let mut bus = BUS.lock();
    let id = bus.next_id;
    bus.next_id += 1;
    bus.channels
        .entry(event.to_string())
        .or_default()
        .push((id, Arc::new(observer)));
    Subscription {
        event: event.to_string(),
        id,
        active: true,
    }
}

/// Delivers `event` to every current observer of that name.
///
/// Observers run outside the bus lock (a snapshot is taken first), so an
/// observer may subscribe or cancel from inside its own callback. A
/// panicking observer is isolated and logged.
pub fn post(event: &str, monitor: &Reachability) {
    let observers: Vec<Observer> = {
        let bus = BUS.lock();
        match bus.channels.get(event) {
            Some(observers) => observers.iter().map(|(_, o)| Arc::clone(o)).collect(),
            None => return,
        }
    };
    for observer in observers {
        if catch_unwind(AssertUnwindSafe(|| observer(monitor))).is_err() {
            error!("observer of {:?} panicked", event);
        }
    }
}

impl Subscription {
    /// Cancels the registration. Idempotent.
    pub fn cancel(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let mut bus = BUS.lock();
        if let Some(observers) = bus.channels.get_mut(&self.event) {
            observers.retain(|(id, _)| *id != self.id);
            if observers.is_empty() {
                bus.channels.remove(&self.event);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Each test posts on its own event name; the bus is process-wide and
    // tests run in parallel.

    #[test]
    fn posting_reaches_every_observer_of_the_name() {
        let monitor = Reachability::for_internet_connection();
        let count = Arc::new(AtomicUsize::new(0));
        let first = {
            let count = Arc::clone(&count);
            observe("bus-test-fanout", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let second = {
            let count = Arc::clone(&count);
            observe("bus-test-fanout", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        post("bus-test-fanout", &monitor);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        drop(first);
        drop(second);
    }

    #[test]
    fn events_are_isolated_by_name() {
        let monitor = Reachability::for_internet_connection();
        let count = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let count = Arc::clone(&count);
            observe("bus-test-isolated-a", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        post("bus-test-isolated-b", &monitor);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_the_subscription_cancels_it() {
        let monitor = Reachability::for_internet_connection();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            let _sub = observe("bus-test-drop", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
            post("bus-test-drop", &monitor);
        }
        post("bus-test-drop", &monitor);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut sub = observe("bus-test-cancel", |_| {});
        sub.cancel();
        sub.cancel();
    }
}
