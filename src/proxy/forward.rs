//! Plain HTTP forwarding (absolute-form requests that are not CONNECT).
//!
//! Each request gets its own hyper client whose connector binds the
//! selected egress address. The upstream host is connected by name through
//! the system resolver; the AAAA lookup done beforehand only gates and logs
//! the request.

use super::context::ProxyContext;
use super::error::ProxyError;
use super::response::{ProxyBody, text_response};
use crate::dns::Resolver;
use crate::egress::bound_http_connector;
use crate::telemetry::AuditEvent;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderName};
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Headers that identify the proxy hop or only apply to one connection.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "proxy-authorization",
    "proxy-authenticate",
    "proxy-connection",
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Handle plain HTTP proxy request (non-CONNECT).
pub async fn handle_http<R: Resolver>(
    mut req: Request<Incoming>,
    peer: SocketAddr,
    ctx: Arc<ProxyContext<R>>,
) -> Result<Response<ProxyBody>, ProxyError> {
    let host = req.uri().host().map(str::to_string);

    if let Err(rejection) = ctx.check_access(req.headers(), peer, host.as_deref()) {
        return Ok(rejection.text_response());
    }

    let Some(host) = host else {
        debug!("Request from {} without absolute URI: {}", peer, req.uri());
        return Ok(text_response(
            StatusCode::BAD_REQUEST,
            "Proxy requests must use an absolute URI",
        ));
    };

    debug!("HTTP proxy request to {} from {}", host, peer);

    let admission = match ctx.admit(peer, &host).await {
        Ok(admission) => admission,
        Err(rejection) => return Ok(rejection.text_response()),
    };

    strip_hop_by_hop_headers(req.headers_mut());

    info!(
        "HTTP: {} [{}] from {}",
        req.uri().authority().map(|a| a.as_str()).unwrap_or(&host),
        admission.target,
        admission.egress
    );

    let method = req.method().to_string();
    let client: Client<HttpConnector, Incoming> =
        Client::builder(TokioExecutor::new()).build(bound_http_connector(admission.egress));

    match client.request(req).await {
        Ok(response) => {
            ctx.audit().log(AuditEvent::RequestForwarded {
                client: peer.to_string(),
                method,
                host,
                target: admission.target.to_string(),
                egress: admission.egress.to_string(),
                status: response.status().as_u16(),
            });
            Ok(response.map(|body| body.boxed()))
        }
        Err(e) => {
            warn!(
                "Upstream request to {} from {} failed: {}",
                host, admission.egress, e
            );
            ctx.audit().log(AuditEvent::DialFailed {
                client: peer.to_string(),
                host,
                egress: admission.egress.to_string(),
                detail: e.to_string(),
            });
            Ok(text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Upstream request failed",
            ))
        }
    }
}

/// Remove proxy and hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(hyper::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }

    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_strip_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("proxy-authorization", HeaderValue::from_static("Basic dTpw"));
        headers.insert("proxy-connection", HeaderValue::from_static("keep-alive"));
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-hop", HeaderValue::from_static("1"));
        headers.insert("accept", HeaderValue::from_static("*/*"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));

        strip_hop_by_hop_headers(&mut headers);

        assert_eq!(headers.len(), 2);
        assert!(headers.contains_key("accept"));
        assert!(headers.contains_key("user-agent"));
    }

    #[test]
    fn test_strip_leaves_clean_headers_alone() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("example.com"));
        strip_hop_by_hop_headers(&mut headers);
        assert_eq!(headers.len(), 1);
    }
}
