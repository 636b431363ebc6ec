//! Audit logging for the egress proxy.
//!
//! Security-relevant events (tunnels, forwarded requests, denials) are
//! serialized as JSON and sent to syslog with the `IPV6_EGRESS_PROXY` tag
//! when enabled. Operational logs are separate and go to stderr via
//! `tracing`.
//!
//! # Event Format
//!
//! ```json
//! {"ts":"2026-01-07T14:32:01Z","event":"tunnel_open","client":"192.0.2.7:51000","host":"example.com","port":443,"target":"2606:2800::1","egress":"2001:db8:42::9"}
//! ```

mod error;
mod events;
mod syslog;

pub use error::TelemetryError;
pub use events::{AuditEvent, ResolutionFailure, TimestampedEvent};
pub use syslog::{AuditLogger, SYSLOG_TAG};
