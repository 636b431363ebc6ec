//! Destination name resolution restricted to IPv6 (AAAA) answers.
//!
//! Two interchangeable strategies are provided:
//!
//! - [`DohResolver`]: DNS-over-HTTPS JSON API
//! - [`DotResolver`]: DNS-over-TLS wire protocol
//!
//! The strategy is chosen once at startup ([`DnsResolver::from_settings`])
//! and injected into the proxy server. There is no cache: every call goes to
//! the upstream resolver.

pub mod doh;
pub mod dot;
pub mod error;

pub use doh::{DEFAULT_DOH_ENDPOINT, DohResolver};
pub use dot::{DEFAULT_DOT_PORT, DEFAULT_DOT_SERVER, DotResolver};
pub use error::ResolveError;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::IpAddr;
use tracing::trace;

/// Hostname → IPv6 address lookup.
pub trait Resolver: Send + Sync + 'static {
    /// Resolve `host` to the first AAAA answer.
    fn resolve(&self, host: &str) -> impl Future<Output = Result<IpAddr, ResolveError>> + Send;

    /// Short label for logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Which encrypted DNS transport to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsStrategy {
    /// DNS-over-HTTPS.
    #[default]
    Doh,
    /// DNS-over-TLS.
    Dot,
}

/// Resolver selection plus endpoints for both strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSettings {
    /// Active strategy.
    pub strategy: DnsStrategy,
    /// DoH JSON endpoint URL.
    pub doh_endpoint: String,
    /// DoT server name.
    pub dot_server: String,
    /// DoT server port.
    pub dot_port: u16,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            strategy: DnsStrategy::Doh,
            doh_endpoint: DEFAULT_DOH_ENDPOINT.to_string(),
            dot_server: DEFAULT_DOT_SERVER.to_string(),
            dot_port: DEFAULT_DOT_PORT,
        }
    }
}

/// The resolver variant selected by configuration.
#[derive(Debug, Clone)]
pub enum DnsResolver {
    /// DNS-over-HTTPS.
    Doh(DohResolver),
    /// DNS-over-TLS.
    Dot(DotResolver),
}

impl DnsResolver {
    /// Build the resolver named by `settings.strategy`.
    pub fn from_settings(settings: &DnsSettings) -> Result<Self, ResolveError> {
        match settings.strategy {
            DnsStrategy::Doh => Ok(DnsResolver::Doh(DohResolver::new(&settings.doh_endpoint)?)),
            DnsStrategy::Dot => Ok(DnsResolver::Dot(DotResolver::new(
                &settings.dot_server,
                settings.dot_port,
            )?)),
        }
    }
}

impl Resolver for DnsResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        match self {
            DnsResolver::Doh(r) => r.resolve(host).await,
            DnsResolver::Dot(r) => r.resolve(host).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            DnsResolver::Doh(_) => "DoH",
            DnsResolver::Dot(_) => "DoT",
        }
    }
}

/// Resolve a request target host.
///
/// IP literals (with or without brackets) are returned as-is without a
/// lookup; everything else goes to `resolver`.
pub async fn resolve_target<R: Resolver>(resolver: &R, host: &str) -> Result<IpAddr, ResolveError> {
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(addr) = bare.parse::<IpAddr>() {
        trace!("Target {} is an address literal", host);
        return Ok(addr);
    }

    resolver.resolve(bare).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl Resolver for CountingResolver {
        async fn resolve(&self, _host: &str) -> Result<IpAddr, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(IpAddr::V6(Ipv6Addr::LOCALHOST))
        }
    }

    #[tokio::test]
    async fn test_literals_skip_lookup() {
        let resolver = CountingResolver {
            calls: AtomicUsize::new(0),
        };

        assert_eq!(
            resolve_target(&resolver, "192.0.2.1").await.unwrap(),
            "192.0.2.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            resolve_target(&resolver, "[2001:db8::1]").await.unwrap(),
            "2001:db8::1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hostnames_are_resolved_every_time() {
        let resolver = CountingResolver {
            calls: AtomicUsize::new(0),
        };

        for _ in 0..3 {
            resolve_target(&resolver, "example.com").await.unwrap();
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_strategy_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: DnsStrategy,
        }

        let w: Wrapper = toml::from_str(r#"strategy = "dot""#).unwrap();
        assert_eq!(w.strategy, DnsStrategy::Dot);
        let w: Wrapper = toml::from_str(r#"strategy = "doh""#).unwrap();
        assert_eq!(w.strategy, DnsStrategy::Doh);
    }

    #[test]
    fn test_default_settings() {
        let settings = DnsSettings::default();
        assert_eq!(settings.strategy, DnsStrategy::Doh);
        assert_eq!(settings.doh_endpoint, DEFAULT_DOH_ENDPOINT);
        assert_eq!(settings.dot_port, 853);
    }

    #[test]
    fn test_from_settings_doh() {
        let resolver = DnsResolver::from_settings(&DnsSettings::default()).unwrap();
        assert!(matches!(resolver, DnsResolver::Doh(_)));
        assert_eq!(resolver.name(), "DoH");
    }
}
