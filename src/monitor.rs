//! The reachability monitor.
//!
//! [`Reachability`] owns the status state machine: it opens a flag source for
//! its target, funnels every raw flag callback through translation and strict
//! change detection on a single dispatch queue, and fans real changes out to
//! the delegate, the weakly held listeners, the optional closure, and the
//! process-wide broadcast. Handles are cheap clones sharing one monitor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::Result;
use crate::queue::DispatchQueue;
use crate::registry::{ReachabilityListener, StatusChangedHandler, SubscriberRegistry};
use crate::source::{FlagCallback, FlagSource, SourceHandle, SystemFlagSource};
use crate::status::{Flags, Status};
use crate::target::{Policy, Target};
use crate::translate::derive_status;

static SHARED: Lazy<Reachability> = Lazy::new(|| {
    let monitor = Reachability::for_internet_connection();
    monitor.set_broadcasts_notifications(true);
    monitor
});

/// Monitors network reachability for one target and notifies subscribers on
/// status changes.
///
/// All translation and fan-out for one monitor runs serialized on the
/// dispatch queue chosen at start time, so subscribers observe changes in
/// chronological order and always see a consistent `(status, previous)`
/// pair. Calling [`start_listening`](Self::start_listening) or
/// [`stop_listening`](Self::stop_listening) from inside a subscriber
/// callback of the same monitor is unsupported.
pub struct Reachability {
    inner: Arc<Inner>,
}

impl Clone for Reachability {
    fn clone(&self) -> Self {
        Reachability {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner {
    target: Target,
    requires_local_network: AtomicBool,
    broadcasts: AtomicBool,
    source: Box<dyn FlagSource>,
    registry: SubscriberRegistry,
    status: Mutex<StatusPair>,
    raw_flags: Mutex<Flags>,
    run: Mutex<RunState>,
    // Bumped on every start and stop; callbacks carry the generation they
    // were attached under and are dropped when it no longer matches.
    generation: AtomicU64,
}

// The pair is only ever written together, as one observed transition.
#[derive(Clone, Copy)]
struct StatusPair {
    current: Status,
    previous: Status,
}

enum RunState {
    Stopped,
    Running {
        handle: Box<dyn SourceHandle>,
        queue: DispatchQueue,
    },
}

impl Reachability {
    /// Monitor for any route to the internet.
    pub fn for_internet_connection() -> Reachability {
        Self::build(Target::AnyConnection, Box::new(SystemFlagSource::new()))
    }

    /// Monitor that only counts local network (WiFi/Ethernet) paths.
    pub fn for_local_network_connection() -> Reachability {
        Self::build(Target::LocalNetworkOnly, Box::new(SystemFlagSource::new()))
    }

    /// Monitor for one specific host, given as a bare host name.
    ///
    /// Fails when the name is empty, malformed, or includes a URI scheme.
    pub fn for_host_name(name: &str) -> Result<Reachability> {
        let target = Target::host_name(name)?;
        Ok(Self::build(target, Box::new(SystemFlagSource::new())))
    }

    /// Monitor backed by a caller-supplied flag source.
    ///
    /// This is the seam for other platforms and for tests that drive
    /// simulated flag changes.
    pub fn with_flag_source(target: Target, source: Box<dyn FlagSource>) -> Result<Reachability> {
        target.validate()?;
        Ok(Self::build(target, source))
    }

    /// The process-wide shared monitor: internet mode with broadcasting
    /// enabled, created lazily on first access and reused for the process
    /// lifetime.
    ///
    /// Tests needing isolation should build their own monitor instead of
    /// relying on the singleton's shared mutable state.
    pub fn shared() -> Reachability {
        SHARED.clone()
    }

    fn build(target: Target, source: Box<dyn FlagSource>) -> Reachability {
        Reachability {
            inner: Arc::new(Inner {
                target,
                requires_local_network: AtomicBool::new(false),
                broadcasts: AtomicBool::new(false),
                source,
                registry: SubscriberRegistry::default(),
                status: Mutex::new(StatusPair {
                    current: Status::NotAvailable,
                    previous: Status::NotAvailable,
                }),
                raw_flags: Mutex::new(Flags::default()),
                run: Mutex::new(RunState::Stopped),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Starts monitoring on the process-wide default queue.
    pub fn start_listening(&self) -> bool {
        self.start_listening_on(&DispatchQueue::global())
    }

    /// Starts monitoring, delivering all notifications on `queue`.
    ///
    /// Idempotent: returns `true` without side effects when already running.
    /// Returns `false` and stays stopped when the flag source cannot be
    /// opened or attached; the cause is logged. The initial status is
    /// computed from the current flags without firing a notification.
    pub fn start_listening_on(&self, queue: &DispatchQueue) -> bool {
        let mut run = self.inner.run.lock();
        if matches!(*run, RunState::Running { .. }) {
            return true;
        }

        let mut handle = match self.inner.source.open(&self.inner.target) {
            Ok(handle) => handle,
            Err(e) => {
                error!("could not open flag source for {}: {}", self.inner.target, e);
                return false;
            }
        };

        let flags = handle.current_flags();
        let initial = derive_status(flags, self.effective_policy());
        *self.inner.raw_flags.lock() = flags;
        {
            let mut pair = self.inner.status.lock();
            *pair = StatusPair {
                current: initial,
                previous: initial,
            };
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(&self.inner);
        let callback: FlagCallback = Arc::new(move |flags| {
            if let Some(inner) = weak.upgrade() {
                Reachability { inner }.handle_flags_changed(flags, generation);
            }
        });

        if let Err(e) = handle.attach(callback, queue) {
            error!("could not attach to flag source for {}: {}", self.inner.target, e);
            return false;
        }

        info!("started monitoring {} (initial status: {})", self.inner.target, initial);
        *run = RunState::Running {
            handle,
            queue: queue.clone(),
        };
        true
    }

    /// Stops monitoring. Idempotent; never fails.
    ///
    /// Once this returns, no further status change is processed for this
    /// monitor until it is restarted: the source detach is synchronous and a
    /// generation fence drops callbacks that were already queued. The last
    /// known status values are retained.
    pub fn stop_listening(&self) {
        let mut run = self.inner.run.lock();
        let RunState::Running { mut handle, .. } = std::mem::replace(&mut *run, RunState::Stopped)
        else {
            return;
        };
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        // Detach joins the source's probe thread; don't hold the lock for it.
        drop(run);
        handle.detach();
        info!("stopped monitoring {}", self.inner.target);
    }

    // Runs on the dispatch queue chosen at start.
    fn handle_flags_changed(&self, flags: Flags, generation: u64) {
        {
            let run = self.inner.run.lock();
            if !matches!(*run, RunState::Running { .. })
                || self.inner.generation.load(Ordering::SeqCst) != generation
            {
                // Stopped, or a stale callback from a previous run.
                return;
            }
        }

        let new_status = derive_status(flags, self.effective_policy());
        debug!("{}: {:?} translates to {}", self.inner.target, flags, new_status);
        *self.inner.raw_flags.lock() = flags;

        let previous = {
            let mut pair = self.inner.status.lock();
            if pair.current == new_status {
                // Spurious source callback; strict deduplication.
                return;
            }
            pair.previous = pair.current;
            pair.current = new_status;
            pair.previous
        };

        info!("{}: status changed {} -> {}", self.inner.target, previous, new_status);
        self.inner
            .registry
            .dispatch(self, new_status, previous, self.broadcasts_notifications());
    }

    /// The target this monitor evaluates connectivity against.
    pub fn target(&self) -> &Target {
        &self.inner.target
    }

    /// Whether the monitor is currently running.
    pub fn is_running(&self) -> bool {
        matches!(*self.inner.run.lock(), RunState::Running { .. })
    }

    /// The queue notifications are delivered on, while running.
    pub fn dispatch_queue(&self) -> Option<DispatchQueue> {
        match &*self.inner.run.lock() {
            RunState::Running { queue, .. } => Some(queue.clone()),
            RunState::Stopped => None,
        }
    }

    /// The current reachability status (last known when stopped).
    pub fn status(&self) -> Status {
        self.inner.status.lock().current
    }

    /// The status before the most recent change.
    pub fn previous_status(&self) -> Status {
        self.inner.status.lock().previous
    }

    pub fn is_reachable(&self) -> bool {
        self.status() != Status::NotAvailable
    }

    pub fn is_reachable_on_local_network(&self) -> bool {
        self.status() == Status::Available
    }

    pub fn is_reachable_on_cellular(&self) -> bool {
        self.status() == Status::AvailableOnCellular
    }

    /// The last raw flag snapshot seen from the source.
    pub fn current_flags(&self) -> Flags {
        *self.inner.raw_flags.lock()
    }

    /// Whether the reported path needs an on-demand connection attempt
    /// (cellular activation, dial-on-demand VPN) before traffic can flow.
    pub fn connection_required(&self) -> bool {
        self.inner.raw_flags.lock().connection_required
    }

    /// Whether cellular-only signals are coerced to
    /// [`Status::NotAvailable`]. Always `true` for a
    /// [`Target::LocalNetworkOnly`] monitor.
    pub fn requires_local_network_connection(&self) -> bool {
        matches!(self.inner.target, Target::LocalNetworkOnly)
            || self.inner.requires_local_network.load(Ordering::Relaxed)
    }

    /// Takes effect from the next flag callback onward.
    pub fn set_requires_local_network_connection(&self, requires: bool) {
        self.inner
            .requires_local_network
            .store(requires, Ordering::Relaxed);
    }

    /// Whether status changes are also posted on the process-wide bus under
    /// [`crate::broadcast::STATUS_CHANGED`]. Off by default.
    pub fn broadcasts_notifications(&self) -> bool {
        self.inner.broadcasts.load(Ordering::Relaxed)
    }

    pub fn set_broadcasts_notifications(&self, broadcasts: bool) {
        self.inner.broadcasts.store(broadcasts, Ordering::Relaxed);
    }

    /// Registers a weakly held listener. The monitor never keeps the
    /// listener alive; a dropped listener is pruned on the next dispatch and
    /// needs no explicit removal.
    pub fn add_listener<L>(&self, listener: &Arc<L>)
    where
        L: ReachabilityListener + 'static,
    {
        let listener: Arc<dyn ReachabilityListener> = listener.clone();
        self.inner.registry.add_listener(&listener);
    }

    /// Removes a previously added listener; no-op if absent.
    pub fn remove_listener<L>(&self, listener: &Arc<L>)
    where
        L: ReachabilityListener + 'static,
    {
        let listener: Arc<dyn ReachabilityListener> = listener.clone();
        self.inner.registry.remove_listener(&listener);
    }

    /// Snapshot of the listeners that are still alive.
    pub fn listeners(&self) -> Vec<Arc<dyn ReachabilityListener>> {
        self.inner.registry.listeners()
    }

    /// Sets the single weakly held delegate, replacing any previous one.
    pub fn set_delegate<L>(&self, delegate: &Arc<L>)
    where
        L: ReachabilityListener + 'static,
    {
        let delegate: Arc<dyn ReachabilityListener> = delegate.clone();
        self.inner.registry.set_delegate(Some(&delegate));
    }

    pub fn clear_delegate(&self) {
        self.inner.registry.set_delegate(None);
    }

    pub fn delegate(&self) -> Option<Arc<dyn ReachabilityListener>> {
        self.inner.registry.delegate()
    }

    /// Sets the status-changed closure, replacing any previous one.
    /// Last write wins for the next dispatch.
    pub fn set_status_changed_handler<F>(&self, handler: F)
    where
        F: Fn(&Reachability, Status, Status) + Send + Sync + 'static,
    {
        let handler: Arc<StatusChangedHandler> = Arc::new(handler);
        self.inner.registry.set_handler(Some(handler));
    }

    pub fn clear_status_changed_handler(&self) {
        self.inner.registry.set_handler(None);
    }

    fn effective_policy(&self) -> Policy {
        Policy {
            requires_local_network: self.requires_local_network_connection(),
            broadcasts: self.broadcasts_notifications(),
        }
    }
}

impl Drop for Inner {
    // Dropping the last handle while running detaches the source; no
    // callback can fire afterwards (they only hold weak references anyway).
    fn drop(&mut self) {
        if let RunState::Running { handle, .. } = self.run.get_mut() {
            handle.detach();
        }
    }
}

impl std::fmt::Debug for Reachability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reachability")
            .field("target", &self.inner.target)
            .field("running", &self.is_running())
            .field("status", &self.status())
            .finish()
    }
}
