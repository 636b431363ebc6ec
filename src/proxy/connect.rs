//! HTTP CONNECT handling.
//!
//! The flow is:
//!
//! 1. Client sends: `CONNECT example.com:443 HTTP/1.1`
//! 2. Access checks (client family, credentials)
//! 3. AAAA resolution of the host; non-IPv6 answers are refused
//! 4. Egress address selection
//! 5. Dial `example.com:443` bound to the egress address
//! 6. Reply `200 Connection established`, then relay bytes until either side
//!    closes
//!
//! Any failure before step 6 is answered with a bare status line and the
//! client connection is closed. No tunnel is set up in that case.

use super::context::ProxyContext;
use super::error::ProxyError;
use super::relay::relay;
use super::response::{ProxyBody, bare_response, empty_body};
use crate::dns::Resolver;
use crate::egress::dial_from;
use crate::telemetry::AuditEvent;
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle an HTTP CONNECT request.
pub async fn handle_connect<R: Resolver>(
    req: Request<Incoming>,
    peer: SocketAddr,
    ctx: Arc<ProxyContext<R>>,
) -> Result<Response<ProxyBody>, ProxyError> {
    let authority = req.uri().authority().map(|a| a.as_str().to_string());

    if let Err(rejection) = ctx.check_access(req.headers(), peer, authority.as_deref()) {
        return Ok(rejection.bare_response());
    }

    let Some(authority) = authority else {
        debug!("CONNECT from {} without authority", peer);
        return Ok(bare_response(StatusCode::BAD_REQUEST));
    };

    let (host, port) = match parse_host_port(&authority) {
        Ok(target) => target,
        Err(e) => {
            debug!("Rejecting CONNECT from {}: {}", peer, e);
            return Ok(bare_response(StatusCode::BAD_REQUEST));
        }
    };

    debug!("CONNECT request to {}:{} from {}", host, port, peer);

    let admission = match ctx.admit(peer, &host).await {
        Ok(admission) => admission,
        Err(rejection) => return Ok(rejection.bare_response()),
    };

    let upstream = match dial_from(admission.egress, &host, port).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(
                "Failed to connect to {}:{} from {}: {}",
                host, port, admission.egress, e
            );
            ctx.audit().log(AuditEvent::DialFailed {
                client: peer.to_string(),
                host: host.clone(),
                egress: admission.egress.to_string(),
                detail: e.to_string(),
            });
            return Ok(bare_response(StatusCode::INTERNAL_SERVER_ERROR));
        }
    };

    info!(
        "CONNECT: {}:{} [{}] from {}",
        host, port, admission.target, admission.egress
    );
    ctx.audit().log(AuditEvent::TunnelOpen {
        client: peer.to_string(),
        host: host.clone(),
        port,
        target: admission.target.to_string(),
        egress: admission.egress.to_string(),
    });

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                relay(TokioIo::new(upgraded), upstream).await;
                debug!("Tunnel closed for {}:{}", host, port);
            }
            Err(e) => {
                warn!("HTTP upgrade failed for {}:{}: {}", host, port, e);
            }
        }
    });

    Ok(connection_established())
}

/// `200 Connection established`, which switches the connection to the tunnel.
fn connection_established() -> Response<ProxyBody> {
    let mut response = Response::new(empty_body());
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(b"Connection established"));
    response
}

/// Parse host:port string from CONNECT authority.
///
/// Examples:
/// - `api.example.com:443` -> ("api.example.com", 443)
/// - `api.example.com` -> ("api.example.com", 443) (default port)
/// - `[2001:db8::1]:8443` -> ("2001:db8::1", 8443)
pub fn parse_host_port(authority: &str) -> Result<(String, u16), ProxyError> {
    if let Some((host, port_str)) = authority.rsplit_once(':') {
        // Bracketed IPv6 literal like [::1]:443
        if host.starts_with('[') && host.ends_with(']') {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| ProxyError::InvalidRequest(format!("Invalid port: {}", port_str)))?;
            let ipv6_host = &host[1..host.len() - 1];
            return Ok((ipv6_host.to_string(), port));
        }

        if host.contains(':') {
            return Err(ProxyError::InvalidRequest(format!(
                "IPv6 literal must be bracketed: {}",
                authority
            )));
        }

        let port = port_str
            .parse::<u16>()
            .map_err(|_| ProxyError::InvalidRequest(format!("Invalid port: {}", port_str)))?;

        if host.is_empty() {
            return Err(ProxyError::InvalidRequest("Empty host".into()));
        }
        Ok((host.to_string(), port))
    } else {
        // No port specified - default to 443 for CONNECT
        Ok((authority.to_string(), 443))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port_with_port() {
        let (host, port) = parse_host_port("api.example.com:443").unwrap();
        assert_eq!(host, "api.example.com");
        assert_eq!(port, 443);
    }

    #[test]
    fn test_parse_host_port_custom_port() {
        let (host, port) = parse_host_port("api.example.com:8443").unwrap();
        assert_eq!(host, "api.example.com");
        assert_eq!(port, 8443);
    }

    #[test]
    fn test_parse_host_port_default() {
        let (host, port) = parse_host_port("api.example.com").unwrap();
        assert_eq!(host, "api.example.com");
        assert_eq!(port, 443);
    }

    #[test]
    fn test_parse_host_port_invalid_port() {
        assert!(parse_host_port("api.example.com:invalid").is_err());
        assert!(parse_host_port("api.example.com:70000").is_err());
    }

    #[test]
    fn test_parse_host_port_ipv6() {
        let (host, port) = parse_host_port("[::1]:443").unwrap();
        assert_eq!(host, "::1");
        assert_eq!(port, 443);
    }

    #[test]
    fn test_parse_host_port_unbracketed_ipv6() {
        assert!(parse_host_port("2001:db8::1:443").is_err());
    }

    #[test]
    fn test_parse_host_port_empty_host() {
        assert!(parse_host_port(":443").is_err());
    }

    #[test]
    fn test_connection_established() {
        let response = connection_established();
        assert_eq!(response.status(), StatusCode::OK);
        let reason = response.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(reason.as_bytes(), b"Connection established");
    }
}
