//! Syslog integration for audit logging.

use std::sync::Mutex;

use syslog::{Facility, Formatter3164};
use tracing::{debug, error};

use super::error::TelemetryError;
use super::events::AuditEvent;

/// Syslog tag for all audit events.
pub const SYSLOG_TAG: &str = "IPV6_EGRESS_PROXY";

/// Audit logger that writes structured JSON events to syslog.
///
/// Shared between connection tasks behind an `Arc`; the writer sits behind a
/// mutex so events can be logged from `&self`.
pub struct AuditLogger {
    /// None indicates a null logger.
    writer: Option<Mutex<syslog::Logger<syslog::LoggerBackend, Formatter3164>>>,
}

impl AuditLogger {
    /// Create a new audit logger connected to the local syslog socket.
    pub fn new() -> Result<Self, TelemetryError> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_DAEMON,
            hostname: None,
            process: SYSLOG_TAG.to_string(),
            pid: std::process::id(),
        };

        let writer = syslog::unix(formatter).map_err(|e| {
            TelemetryError::SyslogConnection(format!("Failed to connect to syslog: {}", e))
        })?;

        debug!("Connected to syslog with tag '{}'", SYSLOG_TAG);
        Ok(Self {
            writer: Some(Mutex::new(writer)),
        })
    }

    /// Create a null audit logger that discards all events.
    pub fn new_null() -> Self {
        Self { writer: None }
    }

    /// Build the logger selected by configuration.
    pub fn from_config(syslog_enabled: bool) -> Result<Self, TelemetryError> {
        if syslog_enabled {
            Self::new()
        } else {
            Ok(Self::new_null())
        }
    }

    /// Log an audit event.
    ///
    /// The event is serialized to JSON with an RFC 3339 timestamp. A null
    /// logger discards it.
    pub fn log(&self, event: AuditEvent) {
        let Some(ref writer) = self.writer else {
            return;
        };

        match serde_json::to_string(&event.with_timestamp()) {
            Ok(json) => {
                match writer.lock() {
                    Ok(mut writer) => {
                        if let Err(e) = writer.info(&json) {
                            error!("Failed to write to syslog: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to acquire syslog writer lock: {}", e);
                    }
                }
                debug!("Logged audit event: {}", json);
            }
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
            }
        }
    }

    /// Check if this is a null logger.
    pub fn is_null(&self) -> bool {
        self.writer.is_none()
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("null", &self.is_null())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syslog_tag() {
        assert_eq!(SYSLOG_TAG, "IPV6_EGRESS_PROXY");
    }

    #[test]
    fn test_null_logger_discards() {
        let logger = AuditLogger::from_config(false).unwrap();
        assert!(logger.is_null());

        logger.log(AuditEvent::ClientRejected {
            client: "[2001:db8::1]:4000".to_string(),
        });
    }

    #[test]
    #[ignore = "Requires running syslog daemon"]
    fn test_logger_creation() {
        let logger = AuditLogger::new().unwrap();
        assert!(!logger.is_null());

        logger.log(AuditEvent::ProxyStop {
            listen: "127.0.0.1:33300".to_string(),
        });
    }
}
