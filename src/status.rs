//! The normalized reachability status and the raw flag model it is derived
//! from.

use std::fmt;

/// Normalized network reachability classification.
///
/// The variant order doubles as the precedence order: a path over the local
/// network always outranks a cellular-only path, which outranks nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Status {
    /// No usable network path.
    #[default]
    NotAvailable,
    /// Reachable, but only over a cellular (WWAN) connection.
    AvailableOnCellular,
    /// Reachable over the local network (WiFi or Ethernet), regardless of
    /// whether cellular is also up.
    Available,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::NotAvailable => write!(f, "not available"),
            Status::AvailableOnCellular => write!(f, "available via cellular"),
            Status::Available => write!(f, "available"),
        }
    }
}

/// Raw connectivity snapshot reported by a flag source.
///
/// These mirror the low-level signals of the underlying platform: which paths
/// exist, and whether an on-demand connection attempt (dial-up style VPN,
/// cellular data activation) would be needed before traffic can flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    /// The target is reported reachable at all.
    pub reachable: bool,
    /// A WiFi or Ethernet path exists.
    pub local_network: bool,
    /// A cellular (WWAN) path exists.
    pub cellular: bool,
    /// Traffic can only flow after an on-demand connection is established.
    /// Still counts as reachable; see [`crate::translate::derive_status`].
    pub connection_required: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_ordering() {
        assert!(Status::Available > Status::AvailableOnCellular);
        assert!(Status::AvailableOnCellular > Status::NotAvailable);
    }

    #[test]
    fn default_is_not_available() {
        assert_eq!(Status::default(), Status::NotAvailable);
        assert!(!Flags::default().reachable);
    }
}
