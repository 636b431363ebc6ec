//! Random egress address generation inside an IPv6 prefix.
//!
//! Every outbound connection gets its own source address. The network bits
//! are copied from the configured prefix and the host bits come from the
//! operating system CSPRNG, drawn fresh on every call:
//!
//! ```text
//!  2001:0db8:1234 : xxxx:xxxx:xxxx:xxxx:xxxx
//! |<-- /48 net -->|<------ 80 random bits ----->|
//! ```
//!
//! The random draw always covers the full 128 bits and is masked down to the
//! host portion, so a draw that happens to start with zero bytes can never
//! shift into network positions.

use super::error::AllocationError;
use cidr::Ipv6Inet;
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// An IPv6 network: the masked network address plus its prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Prefix {
    network: Ipv6Addr,
    len: u8,
}

impl Ipv6Prefix {
    /// Build a prefix from an address and length, masking off any host bits.
    pub fn new(addr: Ipv6Addr, len: u8) -> Result<Self, AllocationError> {
        if len > 128 {
            return Err(AllocationError::InvalidPrefix {
                prefix: format!("{}/{}", addr, len),
                message: "prefix length must be at most 128".to_string(),
            });
        }

        let network = Ipv6Addr::from(u128::from(addr) & network_mask(len));
        Ok(Self { network, len })
    }

    /// Parse a CIDR string such as `2001:db8:1234::/48`.
    ///
    /// Host bits in the address part are accepted and masked off. A bare
    /// address without `/len` is rejected.
    pub fn parse(cidr: &str) -> Result<Self, AllocationError> {
        let inet = parse_inet(cidr)?;
        Self::new(inet.address(), inet.network_length())
    }

    /// Parse a CIDR string, optionally forcing a fixed prefix length.
    ///
    /// The fixed length applies to the address literal, not to the network
    /// the CIDR's own length describes. With `fixed_len = Some(48)`,
    /// `2001:db8:1:2::/64` becomes `2001:db8:1::/48`, and with `Some(64)`,
    /// `2001:db8:1:2::/48` becomes `2001:db8:1:2::/64`.
    pub fn parse_with_fixed_len(cidr: &str, fixed_len: Option<u8>) -> Result<Self, AllocationError> {
        let inet = parse_inet(cidr)?;
        Self::new(inet.address(), fixed_len.unwrap_or(inet.network_length()))
    }

    /// The network address (host bits zero).
    pub fn network(&self) -> Ipv6Addr {
        self.network
    }

    /// Number of fixed network bits.
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Number of random host bits.
    pub fn host_bits(&self) -> u8 {
        128 - self.len
    }

    /// Whether `addr` falls inside this prefix.
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        u128::from(addr) & network_mask(self.len) == u128::from(self.network)
    }
}

impl fmt::Display for Ipv6Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

impl FromStr for Ipv6Prefix {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse `address/len`, keeping the address exactly as written.
fn parse_inet(cidr: &str) -> Result<Ipv6Inet, AllocationError> {
    let cidr = cidr.trim();
    if !cidr.contains('/') {
        return Err(AllocationError::InvalidPrefix {
            prefix: cidr.to_string(),
            message: "expected address/length".to_string(),
        });
    }

    Ipv6Inet::from_str(cidr).map_err(|e| AllocationError::InvalidPrefix {
        prefix: cidr.to_string(),
        message: e.to_string(),
    })
}

/// Generate a random address inside `prefix` using the OS random source.
pub fn allocate(prefix: &Ipv6Prefix) -> Result<Ipv6Addr, AllocationError> {
    allocate_with(prefix, &mut OsRng)
}

/// Parse `cidr` and generate a random address inside it.
///
/// An invalid CIDR fails before any random bytes are drawn.
pub fn allocate_from_cidr(cidr: &str, fixed_len: Option<u8>) -> Result<Ipv6Addr, AllocationError> {
    let prefix = Ipv6Prefix::parse_with_fixed_len(cidr, fixed_len)?;
    allocate(&prefix)
}

/// Generate a random address inside `prefix` from the given random source.
pub fn allocate_with<R>(prefix: &Ipv6Prefix, rng: &mut R) -> Result<Ipv6Addr, AllocationError>
where
    R: RngCore + ?Sized,
{
    let mut bytes = [0u8; 16];
    rng.try_fill_bytes(&mut bytes)?;

    let mask = network_mask(prefix.len);
    let host = u128::from_be_bytes(bytes) & !mask;

    Ok(Ipv6Addr::from(u128::from(prefix.network) | host))
}

/// Bit mask with the leading `len` bits set.
fn network_mask(len: u8) -> u128 {
    match len {
        0 => 0,
        len => u128::MAX << (128 - u32::from(len.min(128))),
    }
}
