//! Outbound connections pinned to a chosen local address.
//!
//! Both proxy paths dial through here: CONNECT tunnels use [`dial_from`]
//! directly, plain HTTP forwarding uses [`bound_http_connector`] inside a
//! per-request hyper client. In both cases the destination hostname goes
//! through the system resolver and only addresses in the egress address
//! family are tried, so a v6 egress address is never paired with a v4
//! destination (or the other way round).

use super::error::DialError;
use hyper_util::client::legacy::connect::HttpConnector;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tracing::{debug, trace};

/// Connect timeout for every upstream dial.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Dial `host:port` from `local` with the default [`CONNECT_TIMEOUT`].
pub async fn dial_from(local: IpAddr, host: &str, port: u16) -> Result<TcpStream, DialError> {
    dial_from_with_timeout(local, host, port, CONNECT_TIMEOUT).await
}

/// Dial `host:port` from `local`, giving up after `timeout`.
///
/// The timeout covers lookup plus every connection attempt. Candidate
/// addresses are tried in resolver order; the first that connects wins.
pub async fn dial_from_with_timeout(
    local: IpAddr,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, DialError> {
    let target = format_target(host, port);

    match tokio::time::timeout(timeout, dial_inner(local, host, port, &target)).await {
        Ok(result) => result,
        Err(_) => Err(DialError::Timeout { target, timeout }),
    }
}

async fn dial_inner(
    local: IpAddr,
    host: &str,
    port: u16,
    target: &str,
) -> Result<TcpStream, DialError> {
    let candidates: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| DialError::Lookup {
            host: host.to_string(),
            source: e,
        })?
        .filter(|addr| addr.is_ipv6() == local.is_ipv6())
        .collect();

    if candidates.is_empty() {
        return Err(DialError::NoAddress {
            host: host.to_string(),
            family: family_name(local),
        });
    }

    let mut last_err = io::Error::new(io::ErrorKind::NotConnected, "no connection attempted");

    for remote in candidates {
        trace!("Dialing {} from {}", remote, local);

        let socket = bind_socket(local)?;
        match socket.connect(remote).await {
            Ok(stream) => {
                debug!("Connected to {} ({}) from {}", target, remote, local);
                return Ok(stream);
            }
            Err(e) => {
                debug!("Connect to {} from {} failed: {}", remote, local, e);
                last_err = e;
            }
        }
    }

    Err(DialError::Connect {
        target: target.to_string(),
        local,
        source: last_err,
    })
}

/// Create a TCP socket bound to `local` on an ephemeral port.
fn bind_socket(local: IpAddr) -> Result<TcpSocket, DialError> {
    let bind_err = |source| DialError::Bind { local, source };

    let socket = match local {
        IpAddr::V4(_) => TcpSocket::new_v4(),
        IpAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(bind_err)?;

    socket.bind(SocketAddr::new(local, 0)).map_err(bind_err)?;
    Ok(socket)
}

/// Build an HTTP connector whose connections originate from `local`.
///
/// With a single local address configured the connector only attempts
/// destination addresses of the same family.
pub fn bound_http_connector(local: IpAddr) -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.set_local_address(Some(local));
    connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
    connector.set_nodelay(true);
    connector
}

fn family_name(addr: IpAddr) -> &'static str {
    match addr {
        IpAddr::V4(_) => "IPv4",
        IpAddr::V6(_) => "IPv6",
    }
}

fn format_target(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_binds_local_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept = tokio::spawn(async move { listener.accept().await.map(|(_, peer)| peer) });

        let stream = dial_from(IpAddr::V4(Ipv4Addr::LOCALHOST), "127.0.0.1", port)
            .await
            .unwrap();
        let peer = accept.await.unwrap().unwrap();

        assert_eq!(stream.local_addr().unwrap().ip(), Ipv4Addr::LOCALHOST);
        assert_eq!(peer, stream.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Grab a free port, then close it so nothing is listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = dial_from(IpAddr::V4(Ipv4Addr::LOCALHOST), "127.0.0.1", port).await;
        assert!(matches!(result, Err(DialError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_dial_family_mismatch() {
        let result = dial_from(IpAddr::V6(Ipv6Addr::LOCALHOST), "127.0.0.1", 80).await;
        match result {
            Err(DialError::NoAddress { family, .. }) => assert_eq!(family, "IPv6"),
            other => panic!("expected NoAddress, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    #[ignore = "requires a network where 10.255.255.1 is unroutable"]
    async fn test_dial_timeout() {
        let result = dial_from_with_timeout(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            "10.255.255.1",
            80,
            Duration::from_millis(200),
        )
        .await;
        assert!(matches!(result, Err(DialError::Timeout { .. })));
    }

    #[test]
    fn test_format_target() {
        assert_eq!(format_target("example.com", 443), "example.com:443");
        assert_eq!(format_target("2001:db8::1", 443), "[2001:db8::1]:443");
    }
}
