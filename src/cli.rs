//! Command-line interface definitions for ipv6proxy.
//!
//! Uses clap's derive API for type-safe argument parsing. Every flag that
//! also exists in the config file is optional here so that an absent flag
//! leaves the file value alone.

use crate::config::{
    AuthConfig, Config, DnsConfig, EgressConfig, GeneralConfig, ListenerConfig, NetworkConfig,
};
use crate::dns::DnsStrategy;
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Forward proxy that sends each request from a random IPv6 address.
///
/// ipv6proxy accepts HTTP and CONNECT requests from IPv4 clients and dials
/// every destination from a freshly generated address inside the configured
/// IPv6 prefix.
#[derive(Parser, Debug, Default)]
#[command(name = "ipv6proxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Port of the random-IPv6 listener [default: 33300].
    #[arg(long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// IPv6 prefix to draw egress addresses from (e.g. 2001:db8:42::/48).
    #[arg(long = "cidr", value_name = "CIDR")]
    pub cidr: Option<String>,

    /// Address to listen on [default: 0.0.0.0].
    #[arg(long = "bind", value_name = "ADDR")]
    pub bind: Option<IpAddr>,

    /// Basic auth username (requires --password).
    #[arg(long = "username", value_name = "USER")]
    pub username: Option<String>,

    /// Basic auth password (requires --username).
    #[arg(long = "password", value_name = "PASS")]
    pub password: Option<String>,

    /// Resolve with DNS-over-HTTPS (true) or DNS-over-TLS (false) [default: true].
    #[arg(
        long = "use-doh",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub use_doh: Option<bool>,

    /// Add a route for the prefix at startup [default: true].
    #[arg(
        long = "auto-route",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub auto_route: Option<bool>,

    /// Enable IPv6 forwarding at startup [default: true].
    #[arg(
        long = "auto-forwarding",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub auto_forwarding: Option<bool>,

    /// Enable IPv6 non-local bind at startup [default: true].
    #[arg(
        long = "auto-ip-nonlocal-bind",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub auto_ip_nonlocal_bind: Option<bool>,

    /// Device the prefix route points at [default: eth0].
    #[arg(long = "route-device", value_name = "DEV")]
    pub route_device: Option<String>,

    /// Prefix length that replaces the one given in --cidr.
    #[arg(long = "fixed-prefix-len", value_name = "BITS")]
    pub fixed_prefix_len: Option<u8>,

    /// Local IPv4 address for the real-IPv4 listener.
    #[arg(long = "real-ipv4", value_name = "ADDR")]
    pub real_ipv4: Option<Ipv4Addr>,

    /// Port of the real-IPv4 listener (requires --real-ipv4).
    #[arg(long = "real-ipv4-port", value_name = "PORT")]
    pub real_ipv4_port: Option<u16>,

    /// Accept clients that connect over IPv6.
    #[arg(long = "allow-ipv6-clients")]
    pub allow_ipv6_clients: bool,

    /// Send audit events to syslog.
    #[arg(long = "syslog")]
    pub syslog: bool,

    /// Path to additional config file.
    ///
    /// Merged on top of the system and user configs. Flags still win.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// The flags as a config layer, for merging over the config files.
    pub fn to_config(&self) -> Config {
        Config {
            general: GeneralConfig {
                verbose: None,
                syslog: self.syslog.then_some(true),
            },
            listener: ListenerConfig {
                port: self.port,
                bind: self.bind,
                real_ipv4: self.real_ipv4,
                real_ipv4_port: self.real_ipv4_port,
                allow_ipv6_clients: self.allow_ipv6_clients.then_some(true),
            },
            egress: EgressConfig {
                cidr: self.cidr.clone(),
                fixed_prefix_len: self.fixed_prefix_len,
            },
            auth: AuthConfig {
                username: self.username.clone(),
                password: self.password.clone(),
            },
            dns: DnsConfig {
                strategy: self.use_doh.map(|doh| {
                    if doh {
                        DnsStrategy::Doh
                    } else {
                        DnsStrategy::Dot
                    }
                }),
                ..Default::default()
            },
            network: NetworkConfig {
                auto_route: self.auto_route,
                auto_forwarding: self.auto_forwarding,
                auto_ip_nonlocal_bind: self.auto_ip_nonlocal_bind,
                route_device: self.route_device.clone(),
            },
        }
    }
}
