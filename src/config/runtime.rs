//! Validated runtime configuration.
//!
//! [`ProxyConfiguration`] is built once from the merged [`Config`] and then
//! shared read-only. All checks that can fail happen here, so a process
//! that gets past startup never hits a configuration error while serving.

use super::error::ConfigError;
use super::schema::Config;
use crate::dns::{DEFAULT_DOH_ENDPOINT, DEFAULT_DOT_PORT, DEFAULT_DOT_SERVER, DnsSettings};
use crate::egress::{EgressMode, Ipv6Prefix};
use crate::proxy::Credentials;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default port of the random-IPv6 listener.
pub const DEFAULT_PORT: u16 = 33300;

/// Default listen address.
pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Default device for the prefix route.
pub const DEFAULT_ROUTE_DEVICE: &str = "eth0";

/// One listening socket and how it picks egress addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSpec {
    /// Socket address to bind.
    pub addr: SocketAddr,
    /// Egress mode of connections accepted here.
    pub egress: EgressMode,
}

/// Host network preparation switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPrep {
    /// Enable IPv6 forwarding.
    pub auto_forwarding: bool,
    /// Add a route for the prefix.
    pub auto_route: bool,
    /// Enable IPv6 non-local bind.
    pub auto_ip_nonlocal_bind: bool,
    /// Device the route points at.
    pub route_device: String,
}

/// Immutable configuration the proxy runs with.
#[derive(Debug, Clone)]
pub struct ProxyConfiguration {
    /// Listeners to start; the random-IPv6 one is always first.
    pub listeners: Vec<ListenerSpec>,
    /// Egress prefix (with any fixed length applied).
    pub prefix: Ipv6Prefix,
    /// Prefix as configured, used for the host route.
    pub cidr: String,
    /// Required proxy credentials; `None` is an open proxy.
    pub credentials: Option<Credentials>,
    /// Destination resolver selection.
    pub dns: DnsSettings,
    /// Refuse clients that connect over IPv6.
    pub ipv4_clients_only: bool,
    /// Log at info level at least.
    pub verbose: bool,
    /// Send audit events to syslog.
    pub syslog: bool,
    /// Host network preparation.
    pub network: NetworkPrep,
}

impl ProxyConfiguration {
    /// Validate a merged config and apply defaults.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let cidr = config
            .egress
            .cidr
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ConfigError::Missing("egress.cidr (--cidr)"))?;

        if let Some(len) = config.egress.fixed_prefix_len
            && len > 128
        {
            return Err(ConfigError::invalid(
                "egress.fixed_prefix_len",
                format!("{} exceeds 128", len),
            ));
        }

        let prefix = Ipv6Prefix::parse_with_fixed_len(&cidr, config.egress.fixed_prefix_len)
            .map_err(|e| ConfigError::invalid("egress.cidr", e))?;

        let credentials = credentials(config.auth.username, config.auth.password)?;

        let bind = config.listener.bind.unwrap_or(DEFAULT_BIND);
        let port = config.listener.port.unwrap_or(DEFAULT_PORT);

        let mut listeners = vec![ListenerSpec {
            addr: SocketAddr::new(bind, port),
            egress: EgressMode::RandomIpv6(prefix),
        }];

        match (config.listener.real_ipv4, config.listener.real_ipv4_port) {
            (Some(addr), Some(real_port)) => {
                if real_port == port {
                    return Err(ConfigError::invalid(
                        "listener.real_ipv4_port",
                        format!("must differ from listener.port ({})", port),
                    ));
                }
                listeners.push(ListenerSpec {
                    addr: SocketAddr::new(bind, real_port),
                    egress: EgressMode::Fixed(IpAddr::V4(addr)),
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::invalid(
                    "listener.real_ipv4_port",
                    "requires listener.real_ipv4 (--real-ipv4)",
                ));
            }
            (Some(_), None) => {
                return Err(ConfigError::invalid(
                    "listener.real_ipv4",
                    "requires listener.real_ipv4_port (--real-ipv4-port)",
                ));
            }
            (None, None) => {}
        }

        let dns = DnsSettings {
            strategy: config.dns.strategy.unwrap_or_default(),
            doh_endpoint: config
                .dns
                .doh_endpoint
                .unwrap_or_else(|| DEFAULT_DOH_ENDPOINT.to_string()),
            dot_server: config
                .dns
                .dot_server
                .unwrap_or_else(|| DEFAULT_DOT_SERVER.to_string()),
            dot_port: config.dns.dot_port.unwrap_or(DEFAULT_DOT_PORT),
        };

        let network = NetworkPrep {
            auto_forwarding: config.network.auto_forwarding.unwrap_or(true),
            auto_route: config.network.auto_route.unwrap_or(true),
            auto_ip_nonlocal_bind: config.network.auto_ip_nonlocal_bind.unwrap_or(true),
            route_device: config
                .network
                .route_device
                .unwrap_or_else(|| DEFAULT_ROUTE_DEVICE.to_string()),
        };

        Ok(Self {
            listeners,
            prefix,
            cidr,
            credentials,
            dns,
            ipv4_clients_only: !config.listener.allow_ipv6_clients.unwrap_or(false),
            verbose: config.general.verbose.unwrap_or(false),
            syslog: config.general.syslog.unwrap_or(false),
            network,
        })
    }
}

/// Empty strings count as unset; one without the other is an error.
fn credentials(
    username: Option<String>,
    password: Option<String>,
) -> Result<Option<Credentials>, ConfigError> {
    let username = username.filter(|u| !u.is_empty());
    let password = password.filter(|p| !p.is_empty());

    match (username, password) {
        (Some(u), Some(p)) => Ok(Some(Credentials::new(u, p))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::invalid(
            "auth.password",
            "username is set but password is not",
        )),
        (None, Some(_)) => Err(ConfigError::invalid(
            "auth.username",
            "password is set but username is not",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsStrategy;

    fn parse(toml_str: &str) -> Result<ProxyConfiguration, ConfigError> {
        ProxyConfiguration::from_config(toml::from_str(toml_str).unwrap())
    }

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse("[egress]\ncidr = \"2001:db8:42::/48\"\n").unwrap();

        assert_eq!(cfg.listeners.len(), 1);
        assert_eq!(cfg.listeners[0].addr, "0.0.0.0:33300".parse().unwrap());
        assert_eq!(
            cfg.listeners[0].egress,
            EgressMode::RandomIpv6(Ipv6Prefix::parse("2001:db8:42::/48").unwrap())
        );
        assert!(cfg.credentials.is_none());
        assert_eq!(cfg.dns.strategy, DnsStrategy::Doh);
        assert_eq!(cfg.dns.doh_endpoint, DEFAULT_DOH_ENDPOINT);
        assert!(cfg.ipv4_clients_only);
        assert!(!cfg.syslog);
        assert!(cfg.network.auto_route);
        assert!(cfg.network.auto_forwarding);
        assert!(cfg.network.auto_ip_nonlocal_bind);
        assert_eq!(cfg.network.route_device, "eth0");
    }

    #[test]
    fn test_cidr_required() {
        assert!(matches!(parse(""), Err(ConfigError::Missing(_))));
        assert!(matches!(
            parse("[egress]\ncidr = \"  \"\n"),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_invalid_cidr() {
        for cidr in ["10.0.0.0/8", "2001:db8::", "2001:db8::/129", "garbage"] {
            let result = parse(&format!("[egress]\ncidr = \"{}\"\n", cidr));
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { .. })),
                "{} should be rejected",
                cidr
            );
        }
    }

    #[test]
    fn test_fixed_prefix_len() {
        let cfg = parse("[egress]\ncidr = \"2001:db8:42:7::/64\"\nfixed_prefix_len = 48\n").unwrap();
        assert_eq!(cfg.prefix.len(), 48);
        assert_eq!(cfg.cidr, "2001:db8:42:7::/64");

        let cfg = parse("[egress]\ncidr = \"2001:db8:42:7::/48\"\nfixed_prefix_len = 64\n").unwrap();
        assert_eq!(cfg.prefix.to_string(), "2001:db8:42:7::/64");

        let result = parse("[egress]\ncidr = \"2001:db8::/48\"\nfixed_prefix_len = 129\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_credentials_pairing() {
        let base = "[egress]\ncidr = \"2001:db8::/48\"\n";

        let cfg = parse(&format!("{}[auth]\nusername = \"u\"\npassword = \"p\"\n", base)).unwrap();
        assert_eq!(cfg.credentials, Some(Credentials::new("u", "p")));

        assert!(parse(&format!("{}[auth]\nusername = \"u\"\n", base)).is_err());
        assert!(parse(&format!("{}[auth]\npassword = \"p\"\n", base)).is_err());

        let cfg = parse(&format!("{}[auth]\nusername = \"\"\npassword = \"\"\n", base)).unwrap();
        assert!(cfg.credentials.is_none());
    }

    #[test]
    fn test_real_ipv4_listener() {
        let cfg = parse(
            r#"
            [egress]
            cidr = "2001:db8::/48"
            [listener]
            bind = "127.0.0.1"
            port = 8000
            real_ipv4 = "203.0.113.5"
            real_ipv4_port = 8001
        "#,
        )
        .unwrap();

        assert_eq!(cfg.listeners.len(), 2);
        assert_eq!(cfg.listeners[1].addr, "127.0.0.1:8001".parse().unwrap());
        assert_eq!(
            cfg.listeners[1].egress,
            EgressMode::Fixed("203.0.113.5".parse().unwrap())
        );
    }

    #[test]
    fn test_real_ipv4_validation() {
        let base = "[egress]\ncidr = \"2001:db8::/48\"\n[listener]\n";

        assert!(parse(&format!("{}real_ipv4_port = 8001\n", base)).is_err());
        assert!(parse(&format!("{}real_ipv4 = \"203.0.113.5\"\n", base)).is_err());
        assert!(
            parse(&format!(
                "{}port = 8000\nreal_ipv4 = \"203.0.113.5\"\nreal_ipv4_port = 8000\n",
                base
            ))
            .is_err()
        );
    }

    #[test]
    fn test_allow_ipv6_clients() {
        let cfg = parse("[egress]\ncidr = \"2001:db8::/48\"\n[listener]\nallow_ipv6_clients = true\n")
            .unwrap();
        assert!(!cfg.ipv4_clients_only);
    }
}
