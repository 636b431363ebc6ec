//! Configuration system for ipv6proxy.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. System config: `/etc/ipv6-egress-proxy/config.toml`
//! 2. User config: `~/.config/ipv6-egress-proxy/config.toml`
//! 3. Additional config file (via `--config` flag)
//! 4. CLI flags (highest priority)
//!
//! Config files are optional; the merged result is validated into a
//! [`ProxyConfiguration`], which fails if no source provided the egress
//! prefix.

mod error;
mod loader;
mod runtime;
mod schema;

pub use error::ConfigError;
pub use loader::{ConfigLoader, SYSTEM_CONFIG_PATH};
pub use runtime::{
    DEFAULT_BIND, DEFAULT_PORT, DEFAULT_ROUTE_DEVICE, ListenerSpec, NetworkPrep,
    ProxyConfiguration,
};
pub use schema::{
    AuthConfig, Config, DnsConfig, EgressConfig, GeneralConfig, ListenerConfig, NetworkConfig,
};
