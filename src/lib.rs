//! netreach — network reachability monitoring for the host device.
//!
//! This crate answers "is the network usable right now, and how (local
//! network vs. cellular)?" and notifies subscribers only when that answer
//! changes:
//! - Normalized tri-state status and raw flag model (`status`)
//! - Monitoring targets and translation policy (`target`)
//! - Pure flag-to-status translation (`translate`)
//! - Serial dispatch queues carrying all notifications (`queue`)
//! - Pluggable connectivity flag sources (`source`)
//! - Delegate/listener/closure fan-out (`registry`)
//! - Optional process-wide broadcast bus (`broadcast`)
//! - The monitor itself, with its constructors and the shared singleton
//!   (`monitor`)
//!
//! Key types are re-exported here for easier access.
//!
//! ```no_run
//! use netreach::Reachability;
//!
//! let monitor = Reachability::for_internet_connection();
//! monitor.set_status_changed_handler(|_, status, previous| {
//!     println!("network went from {} to {}", previous, status);
//! });
//! monitor.start_listening();
//! ```

pub mod broadcast;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod source;
pub mod status;
pub mod target;
pub mod translate;

pub use error::{Error, Result};
pub use monitor::Reachability;
pub use queue::DispatchQueue;
pub use registry::{ReachabilityListener, StatusChangedHandler};
pub use source::{FlagCallback, FlagSource, SourceHandle, SystemFlagSource};
pub use status::{Flags, Status};
pub use target::{Policy, Target};
pub use translate::derive_status;
