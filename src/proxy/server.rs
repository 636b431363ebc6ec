//! HTTP proxy server implementation.
//!
//! One [`ProxyServer`] owns one TCP listener and one egress mode. Each
//! accepted connection is served on its own Tokio task by hyper's HTTP/1.1
//! server with upgrade support (needed for CONNECT). The accept loop exits
//! when the shutdown watch channel flips to `true`.

use super::auth::Credentials;
use super::connect::handle_connect;
use super::context::ProxyContext;
use super::error::{ProxyError, ProxyResult};
use super::forward::handle_http;
use super::response::ProxyBody;
use crate::dns::Resolver;
use crate::egress::EgressMode;
use crate::telemetry::{AuditEvent, AuditLogger};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A bound proxy listener.
pub struct ProxyServer<R> {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: Arc<ProxyContext<R>>,
    resolver_name: &'static str,
    shutdown_rx: watch::Receiver<bool>,
}

impl<R: Resolver> ProxyServer<R> {
    /// Bind `listen_addr` and prepare to serve with `context`.
    pub async fn bind(
        listen_addr: SocketAddr,
        context: ProxyContext<R>,
        resolver_name: &'static str,
        shutdown_rx: watch::Receiver<bool>,
    ) -> ProxyResult<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| ProxyError::Bind {
                addr: listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            context: Arc::new(context),
            resolver_name,
            shutdown_rx,
        })
    }

    /// Address the listener is bound to (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Egress mode of this listener.
    pub fn egress(&self) -> EgressMode {
        self.context.egress()
    }

    /// Accept and serve connections until shutdown is signalled.
    pub async fn run(self) -> ProxyResult<()> {
        info!(
            "Proxy listening on {} (egress: {}, resolver: {})",
            self.local_addr,
            self.context.egress(),
            self.resolver_name
        );
        self.context.audit().log(AuditEvent::ProxyStart {
            listen: self.local_addr.to_string(),
            egress: self.context.egress().to_string(),
            resolver: self.resolver_name.to_string(),
        });

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            self.spawn_connection_handler(stream, peer);
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Proxy on {} shutting down", self.local_addr);
                        break;
                    }
                }
            }
        }

        self.context.audit().log(AuditEvent::ProxyStop {
            listen: self.local_addr.to_string(),
        });

        Ok(())
    }

    /// Spawn a task to handle a single connection.
    fn spawn_connection_handler(&self, stream: TcpStream, peer: SocketAddr) {
        let context = self.context.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, context).await {
                // Client resets are routine for a proxy
                let err_str = e.to_string();
                if err_str.contains("connection reset")
                    || err_str.contains("broken pipe")
                    || err_str.contains("Connection reset")
                {
                    debug!("Connection from {} ended: {}", peer, e);
                } else {
                    warn!("Connection error from {}: {}", peer, e);
                }
            }
        });
    }
}

/// Serve one client connection.
async fn handle_connection<R: Resolver>(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<ProxyContext<R>>,
) -> ProxyResult<()> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
    }
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let context = context.clone();
        async move { proxy_request(req, peer, context).await }
    });

    // Serve HTTP/1.1 with support for upgrades (needed for CONNECT)
    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .map_err(ProxyError::from)
}

/// Process a single proxy request.
async fn proxy_request<R: Resolver>(
    req: Request<Incoming>,
    peer: SocketAddr,
    context: Arc<ProxyContext<R>>,
) -> ProxyResult<Response<ProxyBody>> {
    if req.method() == Method::CONNECT {
        handle_connect(req, peer, context).await
    } else {
        handle_http(req, peer, context).await
    }
}

/// Builder for [`ProxyServer`].
pub struct ProxyServerBuilder<R> {
    listen_addr: Option<SocketAddr>,
    egress: Option<EgressMode>,
    resolver: Option<Arc<R>>,
    credentials: Option<Credentials>,
    ipv4_clients_only: bool,
    audit: Option<Arc<AuditLogger>>,
}

impl<R: Resolver> ProxyServerBuilder<R> {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            listen_addr: None,
            egress: None,
            resolver: None,
            credentials: None,
            ipv4_clients_only: false,
            audit: None,
        }
    }

    /// Set the address to listen on.
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Set the egress mode.
    pub fn egress(mut self, egress: EgressMode) -> Self {
        self.egress = Some(egress);
        self
    }

    /// Set the destination resolver.
    pub fn resolver(mut self, resolver: Arc<R>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Require these proxy credentials. Without them the proxy is open.
    pub fn credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Refuse clients that do not connect over IPv4.
    pub fn ipv4_clients_only(mut self, enabled: bool) -> Self {
        self.ipv4_clients_only = enabled;
        self
    }

    /// Set the audit logger. Defaults to a null logger.
    pub fn audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Bind the listener and build the server.
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> ProxyResult<ProxyServer<R>> {
        let listen_addr = self.listen_addr.ok_or(ProxyError::Incomplete("listen_addr"))?;
        let egress = self.egress.ok_or(ProxyError::Incomplete("egress"))?;
        let resolver = self.resolver.ok_or(ProxyError::Incomplete("resolver"))?;
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(AuditLogger::new_null()));

        let resolver_name = resolver.name();
        let context = ProxyContext::new(
            resolver,
            self.credentials,
            self.ipv4_clients_only,
            egress,
            audit,
        );

        ProxyServer::bind(listen_addr, context, resolver_name, shutdown_rx).await
    }
}

impl<R: Resolver> Default for ProxyServerBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}
