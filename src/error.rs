//! Error types for netreach.
//!
//! Construction and source failures are strongly typed using thiserror so
//! callers can branch on the specific condition. Stopping a monitor never
//! fails and has no error variant.

use thiserror::Error;

/// Errors raised while constructing or starting a reachability monitor.
#[derive(Debug, Error)]
pub enum Error {
    /// The supplied host name is empty, carries a URI scheme, or is otherwise
    /// not a bare host name.
    #[error("invalid host name: {0}")]
    InvalidHostName(String),

    /// The underlying connectivity flag source could not be opened for the
    /// requested target.
    #[error("failed to open connectivity flag source: {0}")]
    SourceOpen(String),

    /// The flag source rejected the callback registration.
    #[error("failed to attach connectivity callback: {0}")]
    SourceAttach(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
