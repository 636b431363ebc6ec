//! Configuration file schema.
//!
//! Every field is optional so that a later source only overrides what it
//! actually sets. Defaults are applied when the merged result is validated
//! into a [`ProxyConfiguration`](super::ProxyConfiguration).
//!
//! ```toml
//! [listener]
//! port = 33300
//! bind = "0.0.0.0"
//! real_ipv4 = "203.0.113.5"
//! real_ipv4_port = 33301
//!
//! [egress]
//! cidr = "2001:db8:42::/48"
//!
//! [auth]
//! username = "proxy"
//! password = "secret"
//!
//! [dns]
//! strategy = "dot"
//!
//! [network]
//! auto_route = false
//! ```

use crate::dns::DnsStrategy;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Listener settings.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Egress address settings.
    #[serde(default)]
    pub egress: EgressConfig,

    /// Proxy credentials.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Destination resolver settings.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Host network preparation switches.
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Config {
    /// Merge another config into this one. Values set in `other` win.
    pub fn merge(&mut self, other: Config) {
        self.general.merge(other.general);
        self.listener.merge(other.listener);
        self.egress.merge(other.egress);
        self.auth.merge(other.auth);
        self.dns.merge(other.dns);
        self.network.merge(other.network);
    }
}

/// Override `slot` when `value` is set.
fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Log at info level at least.
    pub verbose: Option<bool>,

    /// Send audit events to syslog.
    pub syslog: Option<bool>,
}

impl GeneralConfig {
    fn merge(&mut self, other: GeneralConfig) {
        overlay(&mut self.verbose, other.verbose);
        overlay(&mut self.syslog, other.syslog);
    }
}

/// Listening sockets.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// Port of the random-IPv6 listener.
    pub port: Option<u16>,

    /// Address both listeners bind to.
    pub bind: Option<IpAddr>,

    /// Local IPv4 address used by the real-IPv4 listener.
    pub real_ipv4: Option<Ipv4Addr>,

    /// Port of the real-IPv4 listener.
    pub real_ipv4_port: Option<u16>,

    /// Accept clients connecting over IPv6.
    pub allow_ipv6_clients: Option<bool>,
}

impl ListenerConfig {
    fn merge(&mut self, other: ListenerConfig) {
        overlay(&mut self.port, other.port);
        overlay(&mut self.bind, other.bind);
        overlay(&mut self.real_ipv4, other.real_ipv4);
        overlay(&mut self.real_ipv4_port, other.real_ipv4_port);
        overlay(&mut self.allow_ipv6_clients, other.allow_ipv6_clients);
    }
}

/// Egress prefix.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EgressConfig {
    /// IPv6 prefix in CIDR form.
    pub cidr: Option<String>,

    /// Prefix length that replaces the one in `cidr`.
    pub fixed_prefix_len: Option<u8>,
}

impl EgressConfig {
    fn merge(&mut self, other: EgressConfig) {
        overlay(&mut self.cidr, other.cidr);
        overlay(&mut self.fixed_prefix_len, other.fixed_prefix_len);
    }
}

/// Basic proxy credentials.
#[derive(Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Username.
    pub username: Option<String>,

    /// Password.
    pub password: Option<String>,
}

impl AuthConfig {
    fn merge(&mut self, other: AuthConfig) {
        overlay(&mut self.username, other.username);
        overlay(&mut self.password, other.password);
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Destination resolver settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DnsConfig {
    /// `doh` or `dot`.
    pub strategy: Option<DnsStrategy>,

    /// DoH JSON endpoint URL.
    pub doh_endpoint: Option<String>,

    /// DoT server name.
    pub dot_server: Option<String>,

    /// DoT server port.
    pub dot_port: Option<u16>,
}

impl DnsConfig {
    fn merge(&mut self, other: DnsConfig) {
        overlay(&mut self.strategy, other.strategy);
        overlay(&mut self.doh_endpoint, other.doh_endpoint);
        overlay(&mut self.dot_server, other.dot_server);
        overlay(&mut self.dot_port, other.dot_port);
    }
}

/// Host network preparation run at startup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Add a route for the egress prefix.
    pub auto_route: Option<bool>,

    /// Enable IPv6 forwarding.
    pub auto_forwarding: Option<bool>,

    /// Enable IPv6 non-local bind.
    pub auto_ip_nonlocal_bind: Option<bool>,

    /// Device the prefix route points at.
    pub route_device: Option<String>,
}

impl NetworkConfig {
    fn merge(&mut self, other: NetworkConfig) {
        overlay(&mut self.auto_route, other.auto_route);
        overlay(&mut self.auto_forwarding, other.auto_forwarding);
        overlay(&mut self.auto_ip_nonlocal_bind, other.auto_ip_nonlocal_bind);
        overlay(&mut self.route_device, other.route_device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [general]
            verbose = true
            syslog = true

            [listener]
            port = 8080
            bind = "127.0.0.1"
            real_ipv4 = "203.0.113.5"
            real_ipv4_port = 8081
            allow_ipv6_clients = true

            [egress]
            cidr = "2001:db8:42::/48"
            fixed_prefix_len = 64

            [auth]
            username = "proxy"
            password = "secret"

            [dns]
            strategy = "dot"
            dot_server = "dns.example"
            dot_port = 8853

            [network]
            auto_route = false
            route_device = "ens3"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.verbose, Some(true));
        assert_eq!(config.listener.port, Some(8080));
        assert_eq!(config.listener.real_ipv4, Some(Ipv4Addr::new(203, 0, 113, 5)));
        assert_eq!(config.egress.cidr.as_deref(), Some("2001:db8:42::/48"));
        assert_eq!(config.egress.fixed_prefix_len, Some(64));
        assert_eq!(config.dns.strategy, Some(DnsStrategy::Dot));
        assert_eq!(config.dns.dot_port, Some(8853));
        assert_eq!(config.network.auto_route, Some(false));
        assert_eq!(config.network.auto_forwarding, None);
        assert_eq!(config.network.route_device.as_deref(), Some("ens3"));
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<Config, _> = toml::from_str("[listener]\nprot = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_overrides_only_set_values() {
        let mut base: Config = toml::from_str(
            r#"
            [listener]
            port = 1000
            bind = "0.0.0.0"
            [egress]
            cidr = "2001:db8::/32"
        "#,
        )
        .unwrap();

        let overlay: Config = toml::from_str(
            r#"
            [listener]
            port = 2000
            [auth]
            username = "u"
        "#,
        )
        .unwrap();

        base.merge(overlay);

        assert_eq!(base.listener.port, Some(2000));
        assert_eq!(base.listener.bind, Some("0.0.0.0".parse().unwrap()));
        assert_eq!(base.egress.cidr.as_deref(), Some("2001:db8::/32"));
        assert_eq!(base.auth.username.as_deref(), Some("u"));
    }

    #[test]
    fn test_auth_debug_redacts_password() {
        let auth = AuthConfig {
            username: Some("u".to_string()),
            password: Some("hunter2".to_string()),
        };
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("hunter2"));
    }
}
