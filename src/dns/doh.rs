//! DNS-over-HTTPS resolution using the JSON API.
//!
//! Sends `GET <endpoint>?name=<host>&type=AAAA` with
//! `accept: application/dns-json` and picks the first answer of type 28.

use super::Resolver;
use super::error::ResolveError;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Default DoH endpoint.
pub const DEFAULT_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";

/// Numeric DNS record type for AAAA.
pub const AAAA_RECORD_TYPE: u16 = 28;

const DNS_JSON: &str = "application/dns-json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON answer body returned by DoH providers.
#[derive(Debug, Default, Deserialize)]
pub struct DohResponse {
    /// DNS response code (0 = NOERROR).
    #[serde(rename = "Status", default)]
    pub status: u16,
    /// Answer section.
    #[serde(rename = "Answer", default)]
    pub answer: Vec<DohAnswer>,
}

/// One record from the answer section.
#[derive(Debug, Deserialize)]
pub struct DohAnswer {
    /// Owner name.
    #[serde(default)]
    pub name: String,
    /// Numeric record type.
    #[serde(rename = "type")]
    pub record_type: u16,
    /// Time to live in seconds.
    #[serde(rename = "TTL", default)]
    pub ttl: u32,
    /// Record data; an address literal for A/AAAA.
    pub data: String,
}

/// Resolver that queries a DoH JSON endpoint.
#[derive(Debug, Clone)]
pub struct DohResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl DohResolver {
    /// Create a resolver for the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ResolveError::Setup {
                resolver: "DoH",
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// The endpoint URL queries are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn query(&self, host: &str) -> Result<IpAddr, ResolveError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", host), ("type", "AAAA")])
            .header(ACCEPT, DNS_JSON)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ResolveError::transport("DoH", host, e))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ResolveError::transport("DoH", host, e))?;

        parse_doh_response(host, &body)
    }
}

impl Resolver for DohResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        debug!("DoH AAAA query for {} via {}", host, self.endpoint);
        self.query(host).await
    }

    fn name(&self) -> &'static str {
        "DoH"
    }
}

/// Extract the first AAAA answer from a DoH JSON body.
pub fn parse_doh_response(host: &str, body: &[u8]) -> Result<IpAddr, ResolveError> {
    let response: DohResponse =
        serde_json::from_slice(body).map_err(|e| ResolveError::transport("DoH", host, e))?;

    let answer = response
        .answer
        .iter()
        .find(|a| a.record_type == AAAA_RECORD_TYPE)
        .ok_or_else(|| ResolveError::NoAaaaRecord {
            host: host.to_string(),
        })?;

    answer.data.trim().parse::<IpAddr>().map_err(|e| {
        ResolveError::transport("DoH", host, format!("invalid AAAA data '{}': {}", answer.data, e))
    })
}
