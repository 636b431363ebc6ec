//! Error types for egress address allocation and bound dialing.

use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while generating an egress address.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The configured prefix is not a valid IPv6 network.
    #[error("Invalid IPv6 prefix '{prefix}': {message}")]
    InvalidPrefix {
        /// The CIDR string (or prefix description) that was rejected.
        prefix: String,
        /// Why it was rejected.
        message: String,
    },

    /// The operating system random source could not produce bytes.
    #[error("Random source unavailable: {0}")]
    RandomSource(#[from] rand::Error),
}

/// Errors produced while opening an outbound connection from a fixed local address.
#[derive(Debug, Error)]
pub enum DialError {
    /// Hostname lookup for the destination failed.
    #[error("Failed to look up '{host}': {source}")]
    Lookup {
        /// Destination host.
        host: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The destination has no address in the egress address family.
    #[error("No {family} address found for '{host}'")]
    NoAddress {
        /// Destination host.
        host: String,
        /// "IPv4" or "IPv6".
        family: &'static str,
    },

    /// Binding the outbound socket to the egress address failed.
    #[error("Failed to bind local address {local}: {source}")]
    Bind {
        /// Egress address that could not be bound.
        local: IpAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Every candidate address refused or failed the connection.
    #[error("Failed to connect to '{target}' from {local}: {source}")]
    Connect {
        /// `host:port` being dialed.
        target: String,
        /// Egress address used.
        local: IpAddr,
        /// The last underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The dial did not complete within the connect timeout.
    #[error("Connecting to '{target}' timed out after {timeout:?}")]
    Timeout {
        /// `host:port` being dialed.
        target: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },
}
