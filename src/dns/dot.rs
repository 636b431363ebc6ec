//! DNS-over-TLS resolution (RFC 7858).
//!
//! Each lookup opens a fresh TLS session to the resolver, sends one
//! length-prefixed AAAA query with recursion desired, and reads one answer.

use super::Resolver;
use super::error::ResolveError;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use rand::Rng;
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Default DoT server name (also used for SNI and certificate checks).
pub const DEFAULT_DOT_SERVER: &str = "dns.cloudflare.com";

/// Standard DoT port.
pub const DEFAULT_DOT_PORT: u16 = 853;

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolver that queries a DoT server.
#[derive(Clone)]
pub struct DotResolver {
    server: String,
    port: u16,
    server_name: ServerName<'static>,
    connector: TlsConnector,
}

impl DotResolver {
    /// Create a resolver for `server:port`, verifying the server certificate
    /// against the system root store.
    pub fn new(server: impl Into<String>, port: u16) -> Result<Self, ResolveError> {
        let server = server.into();
        let server_name = ServerName::try_from(server.clone()).map_err(|_| ResolveError::Setup {
            resolver: "DoT",
            message: format!("invalid server name: {}", server),
        })?;

        Ok(Self {
            server,
            port,
            server_name,
            connector: create_tls_connector()?,
        })
    }

    /// `server:port` this resolver talks to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    async fn exchange(&self, host: &str, query: &[u8]) -> Result<Vec<u8>, ResolveError> {
        let err = |e: std::io::Error| ResolveError::transport("DoT", host, e);

        let tcp = TcpStream::connect((self.server.as_str(), self.port))
            .await
            .map_err(err)?;
        let mut tls = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(err)?;

        let len = u16::try_from(query.len())
            .map_err(|_| ResolveError::transport("DoT", host, "query too large"))?;
        let mut frame = Vec::with_capacity(query.len() + 2);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(query);
        tls.write_all(&frame).await.map_err(err)?;
        tls.flush().await.map_err(err)?;

        let mut len_buf = [0u8; 2];
        tls.read_exact(&mut len_buf).await.map_err(err)?;
        let mut response = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
        tls.read_exact(&mut response).await.map_err(err)?;

        trace!("DoT response for {}: {} bytes", host, response.len());
        Ok(response)
    }
}

impl Resolver for DotResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        debug!("DoT AAAA query for {} via {}", host, self.address());

        let id: u16 = rand::thread_rng().r#gen();
        let query = build_aaaa_query(host, id)?;

        let response = tokio::time::timeout(QUERY_TIMEOUT, self.exchange(host, &query))
            .await
            .map_err(|_| ResolveError::transport("DoT", host, "query timed out"))??;

        parse_aaaa_response(host, id, &response)
    }

    fn name(&self) -> &'static str {
        "DoT"
    }
}

impl std::fmt::Debug for DotResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DotResolver")
            .field("server", &self.server)
            .field("port", &self.port)
            .finish()
    }
}

/// Encode a recursive AAAA query for `host` in DNS wire format.
pub fn build_aaaa_query(host: &str, id: u16) -> Result<Vec<u8>, ResolveError> {
    let mut name =
        Name::from_ascii(host).map_err(|e| ResolveError::transport("DoT", host, e))?;
    name.set_fqdn(true);

    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(name, RecordType::AAAA));

    message
        .to_vec()
        .map_err(|e| ResolveError::transport("DoT", host, e))
}

/// Decode a DNS wire response and return its first AAAA address.
pub fn parse_aaaa_response(host: &str, id: u16, bytes: &[u8]) -> Result<IpAddr, ResolveError> {
    let message =
        Message::from_vec(bytes).map_err(|e| ResolveError::transport("DoT", host, e))?;

    if message.id() != id {
        return Err(ResolveError::transport(
            "DoT",
            host,
            format!("response id {} does not match query id {}", message.id(), id),
        ));
    }

    match message.response_code() {
        ResponseCode::NoError => {}
        ResponseCode::NXDomain => {
            return Err(ResolveError::NoAaaaRecord {
                host: host.to_string(),
            });
        }
        code => {
            return Err(ResolveError::transport(
                "DoT",
                host,
                format!("DNS query failed: {}", code),
            ));
        }
    }

    message
        .answers()
        .iter()
        .find_map(|record| match record.data() {
            Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .ok_or_else(|| ResolveError::NoAaaaRecord {
            host: host.to_string(),
        })
}

/// Build a TLS connector trusting the system root certificates.
fn create_tls_connector() -> Result<TlsConnector, ResolveError> {
    let setup_err = |message: String| ResolveError::Setup {
        resolver: "DoT",
        message,
    };

    let mut root_store = rustls::RootCertStore::empty();
    let native_certs = rustls_native_certs::load_native_certs();

    for err in native_certs.errors {
        debug!("Warning loading native cert: {}", err);
    }

    for cert in native_certs.certs {
        if let Err(e) = root_store.add(cert) {
            debug!("Warning adding cert to store: {}", e);
        }
    }

    if root_store.is_empty() {
        return Err(setup_err("no system root certificates found".to_string()));
    }

    debug!("Loaded {} root certificates", root_store.len());

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| setup_err(e.to_string()))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}
