//! ipv6-egress-proxy: a forward proxy that gives every request its own IPv6
//! source address.
//!
//! Clients connect over IPv4 and speak plain HTTP proxy protocol or CONNECT.
//! For each request the proxy checks credentials, resolves the destination
//! over encrypted DNS (AAAA only), draws a random address from the operator's
//! IPv6 prefix and dials the destination from it.
//!
//! # Architecture
//!
//! - **Egress**: random address allocation inside a prefix, bound dialing
//! - **DNS**: DNS-over-HTTPS and DNS-over-TLS AAAA resolvers
//! - **Proxy**: hyper HTTP/1.1 server, access gate, CONNECT tunnels, plain
//!   forwarding
//! - **Config**: Hierarchical TOML configuration plus CLI flags
//! - **Telemetry**: Structured syslog audit events
//! - **Netsetup**: Optional kernel/route preparation at startup

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod dns;
pub mod egress;
pub mod netsetup;
pub mod proxy;
pub mod telemetry;
