//! Audit event types for structured logging.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Audit events emitted by the proxy.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A listener started accepting connections.
    ProxyStart {
        /// Listening socket address.
        listen: String,
        /// Egress mode description.
        egress: String,
        /// Resolver in use.
        resolver: String,
    },

    /// A listener stopped.
    ProxyStop {
        /// Listening socket address.
        listen: String,
    },

    /// A CONNECT tunnel was established.
    TunnelOpen {
        /// Client socket address.
        client: String,
        /// Requested host.
        host: String,
        /// Requested port.
        port: u16,
        /// Address the host resolved to.
        target: String,
        /// Local address the upstream connection was bound to.
        egress: String,
    },

    /// A plain HTTP request was forwarded and answered.
    RequestForwarded {
        /// Client socket address.
        client: String,
        /// Request method.
        method: String,
        /// Requested host.
        host: String,
        /// Address the host resolved to.
        target: String,
        /// Local address the upstream connection was bound to.
        egress: String,
        /// Upstream response status.
        status: u16,
    },

    /// Proxy credentials were missing or wrong.
    AuthDenied {
        /// Client socket address.
        client: String,
        /// Requested host, if the request named one.
        host: Option<String>,
    },

    /// Client rejected because it did not connect over IPv4.
    ClientRejected {
        /// Client socket address.
        client: String,
    },

    /// The destination could not be resolved to an IPv6 address.
    ResolutionFailed {
        /// Client socket address.
        client: String,
        /// Requested host.
        host: String,
        /// Failure class.
        reason: ResolutionFailure,
        /// Error detail.
        detail: String,
    },

    /// No egress address could be produced for the request.
    AllocationFailed {
        /// Client socket address.
        client: String,
        /// Requested host.
        host: String,
        /// Egress mode description.
        egress: String,
        /// Error detail.
        detail: String,
    },

    /// Opening the upstream connection failed.
    DialFailed {
        /// Client socket address.
        client: String,
        /// Requested host.
        host: String,
        /// Local address the dial was bound to.
        egress: String,
        /// Error detail.
        detail: String,
    },
}

/// Why resolution rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionFailure {
    /// No AAAA answer exists.
    NoAaaaRecord,
    /// The resolver could not be reached or answered garbage.
    Transport,
    /// The answer was an IPv4 address.
    NotIpv6,
}

/// Wrapper for serializing events with timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedEvent<'a> {
    /// RFC 3339 timestamp.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// The actual event (flattened into this struct).
    #[serde(flatten)]
    pub event: &'a AuditEvent,
}

impl AuditEvent {
    /// Wrap this event with a timestamp for serialization.
    pub fn with_timestamp(&self) -> TimestampedEvent<'_> {
        TimestampedEvent {
            timestamp: Utc::now(),
            event: self,
        }
    }
}
