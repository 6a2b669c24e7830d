//! Translation of raw connectivity flags into a [`Status`].

use crate::status::{Flags, Status};
use crate::target::Policy;

/// Derive the normalized status for a raw flag snapshot.
///
/// A local network path takes precedence over a cellular one. Flags that
/// report "connection required" (on-demand VPN, cellular activation) still
/// count as reachable: the result is optimistic reachability, not confirmed
/// end-to-end connectivity.
pub fn derive_status(flags: Flags, policy: Policy) -> Status {
    if !flags.reachable {
        return Status::NotAvailable;
    }

    let candidate = if flags.local_network {
        Status::Available
    } else if flags.cellular {
        Status::AvailableOnCellular
    } else {
        Status::NotAvailable
    };

    if policy.requires_local_network && candidate == Status::AvailableOnCellular {
        return Status::NotAvailable;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(requires_local_network: bool) -> Policy {
        Policy {
            requires_local_network,
            ..Policy::default()
        }
    }

    #[test]
    fn unreachable_flags_are_not_available() {
        let flags = Flags {
            reachable: false,
            local_network: true,
            cellular: true,
            connection_required: false,
        };
        assert_eq!(derive_status(flags, policy(false)), Status::NotAvailable);
    }

    #[test]
    fn local_network_wins_over_cellular() {
        let flags = Flags {
            reachable: true,
            local_network: true,
            cellular: true,
            connection_required: false,
        };
        assert_eq!(derive_status(flags, policy(false)), Status::Available);
    }

    #[test]
    fn cellular_only_is_available_on_cellular() {
        let flags = Flags {
            reachable: true,
            local_network: false,
            cellular: true,
            connection_required: false,
        };
        assert_eq!(
            derive_status(flags, policy(false)),
            Status::AvailableOnCellular
        );
    }

    #[test]
    fn cellular_is_coerced_when_local_network_required() {
        let flags = Flags {
            reachable: true,
            local_network: false,
            cellular: true,
            connection_required: false,
        };
        assert_eq!(derive_status(flags, policy(true)), Status::NotAvailable);
    }

    #[test]
    fn local_network_survives_the_local_only_policy() {
        let flags = Flags {
            reachable: true,
            local_network: true,
            cellular: false,
            connection_required: false,
        };
        assert_eq!(derive_status(flags, policy(true)), Status::Available);
    }

    #[test]
    fn connection_required_is_still_reachable() {
        let flags = Flags {
            reachable: true,
            local_network: true,
            cellular: false,
            connection_required: true,
        };
        assert_eq!(derive_status(flags, policy(false)), Status::Available);
    }

    #[test]
    fn reachable_without_a_path_is_not_available() {
        let flags = Flags {
            reachable: true,
            local_network: false,
            cellular: false,
            connection_required: false,
        };
        assert_eq!(derive_status(flags, policy(false)), Status::NotAvailable);
    }
}
