//! Connectivity flag sources.
//!
//! A [`FlagSource`] is the seam between a monitor and the platform: it opens
//! a handle for a [`Target`], reports the current raw [`Flags`], and invokes
//! a callback on a [`DispatchQueue`] whenever the flags change. The default
//! [`SystemFlagSource`] probes network interfaces (and, for host targets,
//! name resolution) on its own polling thread. Tests and other platforms can
//! plug in their own source through
//! [`Reachability::with_flag_source`](crate::Reachability::with_flag_source).

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::queue::DispatchQueue;
use crate::status::Flags;
use crate::target::Target;

/// Callback a source invokes with each changed flag snapshot.
pub type FlagCallback = Arc<dyn Fn(Flags) + Send + Sync>;

/// Factory for flag-source handles.
pub trait FlagSource: Send + Sync {
    /// Opens a handle evaluating connectivity against `target`.
    fn open(&self, target: &Target) -> Result<Box<dyn SourceHandle>>;
}

/// An open flag source for a single target.
pub trait SourceHandle: Send {
    /// Synchronously probes the current raw flags.
    fn current_flags(&self) -> Flags;

    /// Registers the callback the source invokes (via `queue`) on changes.
    /// At most one callback may be attached per handle.
    fn attach(&mut self, callback: FlagCallback, queue: &DispatchQueue) -> Result<()>;

    /// Detaches the callback. Synchronous: once this returns, the source
    /// schedules no further invocations.
    fn detach(&mut self);
}

/// How often the system source re-probes interfaces and host resolution.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// Interface name prefixes that indicate a cellular (WWAN) path.
const CELLULAR_PREFIXES: &[&str] = &["wwan", "rmnet", "ppp", "cdc-wdm"];

/// Default flag source: polls the host's network interfaces.
pub struct SystemFlagSource {
    poll_interval: Duration,
}

impl SystemFlagSource {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the probe interval.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for SystemFlagSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagSource for SystemFlagSource {
    fn open(&self, target: &Target) -> Result<Box<dyn SourceHandle>> {
        Ok(Box::new(SystemHandle {
            target: target.clone(),
            poll_interval: self.poll_interval,
            probe: None,
        }))
    }
}

struct SystemHandle {
    target: Target,
    poll_interval: Duration,
    probe: Option<ProbeThread>,
}

struct ProbeThread {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl SourceHandle for SystemHandle {
    fn current_flags(&self) -> Flags {
        probe_flags(&self.target)
    }

    fn attach(&mut self, callback: FlagCallback, queue: &DispatchQueue) -> Result<()> {
        if self.probe.is_some() {
            return Err(Error::SourceAttach(
                "a callback is already attached to this handle".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let target = self.target.clone();
        let queue = queue.clone();
        let interval = self.poll_interval;

        let handle = thread::spawn(move || {
            let mut last = probe_flags(&target);
            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                let flags = probe_flags(&target);
                if flags != last {
                    debug!("flags changed for {}: {:?} -> {:?}", target, last, flags);
                    last = flags;
                    let callback = Arc::clone(&callback);
                    queue.execute(move || callback(flags));
                }
            }
        });

        self.probe = Some(ProbeThread { stop_tx, handle });
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(ProbeThread { stop_tx, handle }) = self.probe.take() {
            // Disconnecting the channel wakes the poll loop immediately.
            drop(stop_tx);
            if handle.join().is_err() {
                warn!("probe thread for {} panicked", self.target);
            }
        }
    }
}

impl Drop for SystemHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

fn probe_flags(target: &Target) -> Flags {
    let mut flags = interface_flags(matches!(target, Target::LocalNetworkOnly));
    if let Target::HostName(name) = target {
        if flags.reachable && !host_resolves(name) {
            flags = Flags::default();
        }
    }
    flags
}

fn interface_flags(local_only: bool) -> Flags {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            debug!("interface enumeration failed: {}", e);
            return Flags::default();
        }
    };

    let mut flags = Flags::default();
    for interface in interfaces {
        if interface.is_loopback() {
            continue;
        }
        if is_cellular_interface(&interface.name) {
            flags.cellular = true;
        } else {
            flags.local_network = true;
        }
    }
    if local_only {
        flags.cellular = false;
    }
    flags.reachable = flags.local_network || flags.cellular;
    flags
}

fn is_cellular_interface(name: &str) -> bool {
    CELLULAR_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn host_resolves(name: &str) -> bool {
    match dns_lookup::lookup_host(name) {
        Ok(addrs) => !addrs.is_empty(),
        Err(_) => false,
    }
}
