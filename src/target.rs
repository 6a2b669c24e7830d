//! Monitoring targets and the runtime policy applied to flag translation.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// What connectivity is evaluated against. Fixed when a monitor is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Any route to the wider internet, local network or cellular.
    AnyConnection,
    /// Only local network (WiFi/Ethernet) paths count; cellular signals are
    /// always discarded for this target.
    LocalNetworkOnly,
    /// Reachability of one specific host, identified by a bare host name.
    HostName(String),
}

// Bare host name: dot-separated labels, no scheme, no path, no port.
static HOST_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*$")
        .expect("host name pattern must compile")
});

impl Target {
    /// Builds a [`Target::HostName`], rejecting anything that is not a bare
    /// host name.
    pub fn host_name(name: &str) -> Result<Target> {
        validate_host_name(name)?;
        Ok(Target::HostName(name.to_string()))
    }

    /// Re-checks the invariants a constructor is expected to have enforced.
    pub fn validate(&self) -> Result<()> {
        match self {
            Target::HostName(name) => validate_host_name(name),
            Target::AnyConnection | Target::LocalNetworkOnly => Ok(()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::AnyConnection => write!(f, "any connection"),
            Target::LocalNetworkOnly => write!(f, "local network only"),
            Target::HostName(name) => write!(f, "host {}", name),
        }
    }
}

/// Validate a bare host name (e.g. `example.com`).
///
/// Names containing a URI scheme (`https://example.com`) are rejected; the
/// flag source contract requires the host alone.
pub fn validate_host_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidHostName("host name is empty".to_string()));
    }
    if name.contains("://") {
        return Err(Error::InvalidHostName(format!(
            "{:?} includes a URI scheme, expected a bare host name",
            name
        )));
    }
    if !HOST_NAME_PATTERN.is_match(name) {
        return Err(Error::InvalidHostName(format!(
            "{:?} is not a valid host name",
            name
        )));
    }
    Ok(())
}

/// Runtime configuration consulted each time raw flags are translated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Policy {
    /// When set, a cellular-only signal is coerced to
    /// [`crate::Status::NotAvailable`].
    pub requires_local_network: bool,
    /// When set, status changes are also published on the process-wide
    /// broadcast bus.
    pub broadcasts: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bare_host_names() {
        assert!(validate_host_name("example.com").is_ok());
        assert!(validate_host_name("localhost").is_ok());
        assert!(validate_host_name("api.v2.example-service.co.uk").is_ok());
    }

    #[test]
    fn rejects_uri_schemes() {
        assert!(validate_host_name("https://example.com").is_err());
        assert!(validate_host_name("ws://example.com").is_err());
    }

    #[test]
    fn rejects_empty_and_malformed_names() {
        assert!(validate_host_name("").is_err());
        assert!(validate_host_name("example.com/path").is_err());
        assert!(validate_host_name("host name").is_err());
        assert!(validate_host_name("-leading.dash").is_err());
    }

    #[test]
    fn host_name_target_carries_the_name() {
        let target = Target::host_name("example.com").unwrap();
        assert_eq!(target, Target::HostName("example.com".to_string()));
        assert!(target.validate().is_ok());
    }
}
