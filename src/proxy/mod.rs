//! Forward proxy that sends every request out from its own egress address.
//!
//! Clients speak ordinary HTTP/1.1 proxy protocol: CONNECT for tunnels and
//! absolute-form requests for plain HTTP. Each request is gated, its target
//! resolved to an IPv6 address, and a local address picked from the
//! listener's [`EgressMode`](crate::egress::EgressMode) before dialing.
//!
//! # Example
//!
//! ```ignore
//! use ipv6_egress_proxy::proxy::ProxyServerBuilder;
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let server = ProxyServerBuilder::new()
//!     .listen_addr("0.0.0.0:33300".parse()?)
//!     .egress(EgressMode::RandomIpv6(prefix))
//!     .resolver(Arc::new(resolver))
//!     .audit(Arc::new(AuditLogger::new_null()))
//!     .build(shutdown_rx)
//!     .await?;
//! server.run().await?;
//! ```

pub mod auth;
pub mod connect;
pub mod context;
pub mod error;
pub mod forward;
pub mod relay;
pub mod response;
pub mod server;

pub use auth::{Credentials, authorize, is_ipv4_client};
pub use context::{Admission, ProxyContext, Rejection};
pub use error::{ProxyError, ProxyResult};
pub use server::{ProxyServer, ProxyServerBuilder};
