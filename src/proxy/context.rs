//! Per-listener request pipeline shared by the CONNECT and plain paths.
//!
//! Every request walks the same stages before anything is dialed:
//! client family check, credential check, AAAA resolution of the target,
//! and egress address selection. A failing stage yields a [`Rejection`]
//! that each path renders in its own framing.

use super::auth::{Credentials, authorize, is_ipv4_client};
use super::response::{ProxyBody, bare_response, text_response, with_challenge};
use crate::dns::{ResolveError, Resolver, resolve_target};
use crate::egress::{AllocationError, EgressMode};
use crate::telemetry::{AuditEvent, AuditLogger, ResolutionFailure};
use hyper::header::PROXY_AUTHORIZATION;
use hyper::{HeaderMap, Response, StatusCode};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a listener needs to mediate requests.
#[derive(Debug)]
pub struct ProxyContext<R> {
    resolver: Arc<R>,
    credentials: Option<Credentials>,
    ipv4_clients_only: bool,
    egress: EgressMode,
    audit: Arc<AuditLogger>,
}

/// Addresses chosen for a request that passed every gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// IPv6 address the target host resolved to.
    pub target: IpAddr,
    /// Local address to bind the upstream connection to.
    pub egress: IpAddr,
}

/// Why a request was turned away before dialing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Client connected over IPv6.
    ClientNotIpv4,
    /// Proxy credentials missing or wrong.
    ProxyAuthRequired,
    /// The target could not be resolved.
    ResolutionFailed,
    /// The target resolved to an IPv4 address.
    NotIpv6,
    /// No egress address could be produced.
    AllocationFailed,
}

impl Rejection {
    /// HTTP status for this rejection.
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::ClientNotIpv4 => StatusCode::FORBIDDEN,
            Rejection::ProxyAuthRequired => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            Rejection::ResolutionFailed => StatusCode::BAD_GATEWAY,
            Rejection::NotIpv6 => StatusCode::FORBIDDEN,
            Rejection::AllocationFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Rejection::ClientNotIpv4 => "Only IPv4 clients are accepted",
            Rejection::ProxyAuthRequired => "Proxy Authentication Required",
            Rejection::ResolutionFailed => "Failed to resolve host",
            Rejection::NotIpv6 => "Only IPv6 destinations are supported",
            Rejection::AllocationFailed => "Failed to generate egress address",
        }
    }

    /// Render for the plain HTTP path.
    pub fn text_response(self) -> Response<ProxyBody> {
        let response = text_response(self.status(), self.message());
        self.challenge_if_needed(response)
    }

    /// Render for the CONNECT path.
    pub fn bare_response(self) -> Response<ProxyBody> {
        let response = bare_response(self.status());
        self.challenge_if_needed(response)
    }

    fn challenge_if_needed(self, response: Response<ProxyBody>) -> Response<ProxyBody> {
        if self == Rejection::ProxyAuthRequired {
            with_challenge(response)
        } else {
            response
        }
    }
}

impl<R: Resolver> ProxyContext<R> {
    /// Create a context for one listener.
    pub fn new(
        resolver: Arc<R>,
        credentials: Option<Credentials>,
        ipv4_clients_only: bool,
        egress: EgressMode,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            resolver,
            credentials,
            ipv4_clients_only,
            egress,
            audit,
        }
    }

    /// Egress mode of this listener.
    pub fn egress(&self) -> EgressMode {
        self.egress
    }

    /// Audit logger shared by the listener's connections.
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Client family and credential checks.
    pub fn check_access(
        &self,
        headers: &HeaderMap,
        peer: SocketAddr,
        host: Option<&str>,
    ) -> Result<(), Rejection> {
        if self.ipv4_clients_only && !is_ipv4_client(peer) {
            debug!("Rejecting non-IPv4 client {}", peer);
            self.audit.log(AuditEvent::ClientRejected {
                client: peer.to_string(),
            });
            return Err(Rejection::ClientNotIpv4);
        }

        let header = headers
            .get(PROXY_AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        if !authorize(header, self.credentials.as_ref()) {
            debug!("Proxy authentication failed for {}", peer);
            self.audit.log(AuditEvent::AuthDenied {
                client: peer.to_string(),
                host: host.map(str::to_string),
            });
            return Err(Rejection::ProxyAuthRequired);
        }

        Ok(())
    }

    /// Resolve `host`, require an IPv6 answer, then pick the egress address.
    pub async fn admit(&self, peer: SocketAddr, host: &str) -> Result<Admission, Rejection> {
        let target = match resolve_target(self.resolver.as_ref(), host).await {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Resolution failed for {}: {}", host, e);
                let reason = match e {
                    ResolveError::NoAaaaRecord { .. } => ResolutionFailure::NoAaaaRecord,
                    _ => ResolutionFailure::Transport,
                };
                self.audit.log(AuditEvent::ResolutionFailed {
                    client: peer.to_string(),
                    host: host.to_string(),
                    reason,
                    detail: e.to_string(),
                });
                return Err(Rejection::ResolutionFailed);
            }
        };

        if !target.is_ipv6() {
            debug!("Target {} resolved to non-IPv6 {}", host, target);
            self.audit.log(AuditEvent::ResolutionFailed {
                client: peer.to_string(),
                host: host.to_string(),
                reason: ResolutionFailure::NotIpv6,
                detail: format!("{} resolved to {}", host, target),
            });
            return Err(Rejection::NotIpv6);
        }

        let egress = self.egress.next_address().map_err(|e| {
            warn!("Egress address allocation failed: {}", e);
            self.audit.log(allocation_failed_event(peer, host, &self.egress, &e));
            Rejection::AllocationFailed
        })?;

        Ok(Admission { target, egress })
    }
}

fn allocation_failed_event(
    peer: SocketAddr,
    host: &str,
    egress: &EgressMode,
    error: &AllocationError,
) -> AuditEvent {
    AuditEvent::AllocationFailed {
        client: peer.to_string(),
        host: host.to_string(),
        egress: egress.to_string(),
        detail: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::egress::Ipv6Prefix;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use hyper::header::HeaderValue;
    use std::collections::HashMap;
    use std::net::Ipv6Addr;

    struct MapResolver(HashMap<&'static str, IpAddr>);

    impl Resolver for MapResolver {
        async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
            self.0
                .get(host)
                .copied()
                .ok_or_else(|| ResolveError::NoAaaaRecord {
                    host: host.to_string(),
                })
        }
    }

    fn context(credentials: Option<Credentials>, ipv4_only: bool) -> ProxyContext<MapResolver> {
        let mut map = HashMap::new();
        map.insert("v6.example", IpAddr::V6("2001:db8::80".parse().unwrap()));
        map.insert("v4.example", IpAddr::V4("192.0.2.80".parse().unwrap()));

        ProxyContext::new(
            Arc::new(MapResolver(map)),
            credentials,
            ipv4_only,
            EgressMode::RandomIpv6(Ipv6Prefix::parse("2001:db8:42::/48").unwrap()),
            Arc::new(AuditLogger::new_null()),
        )
    }

    fn peer_v4() -> SocketAddr {
        "192.0.2.7:50000".parse().unwrap()
    }

    #[test]
    fn test_rejection_statuses() {
        assert_eq!(Rejection::ProxyAuthRequired.status().as_u16(), 407);
        assert_eq!(Rejection::ResolutionFailed.status().as_u16(), 502);
        assert_eq!(Rejection::NotIpv6.status().as_u16(), 403);
        assert_eq!(Rejection::ClientNotIpv4.status().as_u16(), 403);
        assert_eq!(Rejection::AllocationFailed.status().as_u16(), 500);
    }

    #[test]
    fn test_407_carries_challenge_in_both_framings() {
        for response in [
            Rejection::ProxyAuthRequired.text_response(),
            Rejection::ProxyAuthRequired.bare_response(),
        ] {
            assert!(response.headers().contains_key("proxy-authenticate"));
        }
        assert!(
            !Rejection::NotIpv6
                .bare_response()
                .headers()
                .contains_key("proxy-authenticate")
        );
    }

    #[test]
    fn test_access_with_credentials() {
        let ctx = context(Some(Credentials::new("u", "p")), false);
        let mut headers = HeaderMap::new();

        assert_eq!(
            ctx.check_access(&headers, peer_v4(), Some("v6.example")),
            Err(Rejection::ProxyAuthRequired)
        );

        let value = format!("Basic {}", STANDARD.encode("u:p"));
        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        assert_eq!(ctx.check_access(&headers, peer_v4(), None), Ok(()));
    }

    #[test]
    fn test_ipv6_client_rejected_when_ipv4_only() {
        let ctx = context(None, true);
        let peer: SocketAddr = "[2001:db8::7]:50000".parse().unwrap();

        assert_eq!(
            ctx.check_access(&HeaderMap::new(), peer, None),
            Err(Rejection::ClientNotIpv4)
        );
        assert_eq!(ctx.check_access(&HeaderMap::new(), peer_v4(), None), Ok(()));
    }

    #[tokio::test]
    async fn test_admit_ipv6_target() {
        let ctx = context(None, false);
        let admission = ctx.admit(peer_v4(), "v6.example").await.unwrap();

        assert_eq!(admission.target, "2001:db8::80".parse::<IpAddr>().unwrap());
        match admission.egress {
            IpAddr::V6(addr) => {
                let prefix = Ipv6Prefix::parse("2001:db8:42::/48").unwrap();
                assert!(prefix.contains(addr));
            }
            IpAddr::V4(_) => panic!("expected IPv6 egress"),
        }
    }

    #[tokio::test]
    async fn test_admit_rejections() {
        let ctx = context(None, false);

        assert_eq!(
            ctx.admit(peer_v4(), "v4.example").await,
            Err(Rejection::NotIpv6)
        );
        assert_eq!(
            ctx.admit(peer_v4(), "missing.example").await,
            Err(Rejection::ResolutionFailed)
        );
        assert_eq!(
            ctx.admit(peer_v4(), "192.0.2.1").await,
            Err(Rejection::NotIpv6)
        );
    }

    #[test]
    fn test_allocation_failure_event() {
        let mode = EgressMode::RandomIpv6(Ipv6Prefix::parse("2001:db8:42::/48").unwrap());
        let error = AllocationError::InvalidPrefix {
            prefix: "2001:db8:42::/48".to_string(),
            message: "test".to_string(),
        };

        match allocation_failed_event(peer_v4(), "v6.example", &mode, &error) {
            AuditEvent::AllocationFailed {
                client,
                host,
                egress,
                detail,
            } => {
                assert_eq!(client, "192.0.2.7:50000");
                assert_eq!(host, "v6.example");
                assert_eq!(egress, "random IPv6 from 2001:db8:42::/48");
                assert!(detail.contains("Invalid IPv6 prefix"));
            }
            other => panic!("expected AllocationFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_admit_fixed_egress() {
        let mut map = HashMap::new();
        map.insert("v6.example", IpAddr::V6(Ipv6Addr::LOCALHOST));
        let fixed: IpAddr = "203.0.113.5".parse().unwrap();
        let ctx = ProxyContext::new(
            Arc::new(MapResolver(map)),
            None,
            false,
            EgressMode::Fixed(fixed),
            Arc::new(AuditLogger::new_null()),
        );

        let admission = ctx.admit(peer_v4(), "v6.example").await.unwrap();
        assert_eq!(admission.egress, fixed);
    }
}
