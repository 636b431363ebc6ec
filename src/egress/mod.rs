//! Egress address selection and bound outbound dialing.
//!
//! A listener either randomizes its source address inside an IPv6 prefix
//! ([`EgressMode::RandomIpv6`]) or always uses one literal address
//! ([`EgressMode::Fixed`], the "real IPv4" listener).

pub mod allocator;
pub mod dial;
pub mod error;

pub use allocator::{Ipv6Prefix, allocate, allocate_from_cidr};
pub use dial::{CONNECT_TIMEOUT, bound_http_connector, dial_from};
pub use error::{AllocationError, DialError};

use std::fmt;
use std::net::IpAddr;

/// How a listener picks the local address for each outbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressMode {
    /// A fresh random address inside the prefix per connection.
    RandomIpv6(Ipv6Prefix),
    /// Always the same local address.
    Fixed(IpAddr),
}

impl EgressMode {
    /// Pick the local address for the next outbound connection.
    pub fn next_address(&self) -> Result<IpAddr, AllocationError> {
        match self {
            EgressMode::RandomIpv6(prefix) => allocate(prefix).map(IpAddr::V6),
            EgressMode::Fixed(addr) => Ok(*addr),
        }
    }
}

impl fmt::Display for EgressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EgressMode::RandomIpv6(prefix) => write!(f, "random IPv6 from {}", prefix),
            EgressMode::Fixed(addr) => write!(f, "fixed {}", addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_random_mode_stays_in_prefix() {
        let prefix = Ipv6Prefix::parse("2001:db8:42::/48").unwrap();
        let mode = EgressMode::RandomIpv6(prefix);

        let first = mode.next_address().unwrap();
        let second = mode.next_address().unwrap();

        for addr in [first, second] {
            match addr {
                IpAddr::V6(v6) => assert!(prefix.contains(v6)),
                IpAddr::V4(_) => panic!("random mode produced IPv4"),
            }
        }
        assert_ne!(first, second);
    }

    #[test]
    fn test_fixed_mode() {
        let addr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));
        let mode = EgressMode::Fixed(addr);
        assert_eq!(mode.next_address().unwrap(), addr);
        assert_eq!(mode.to_string(), "fixed 203.0.113.7");
    }
}
