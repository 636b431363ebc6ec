//! Error types for destination name resolution.

use thiserror::Error;

/// Errors that can occur while resolving a destination hostname.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The name exists but has no IPv6 answer (A-only hosts land here too).
    #[error("No AAAA record found for {host}")]
    NoAaaaRecord {
        /// Hostname that was queried.
        host: String,
    },

    /// Talking to the upstream resolver failed (network, TLS, HTTP, parse).
    #[error("{resolver} lookup for {host} failed: {message}")]
    Transport {
        /// Which resolver variant failed ("DoH" or "DoT").
        resolver: &'static str,
        /// Hostname that was queried.
        host: String,
        /// Description of the failure.
        message: String,
    },

    /// The resolver could not be constructed.
    #[error("Failed to initialize {resolver} resolver: {message}")]
    Setup {
        /// Which resolver variant failed ("DoH" or "DoT").
        resolver: &'static str,
        /// Description of the failure.
        message: String,
    },
}

impl ResolveError {
    pub(crate) fn transport(resolver: &'static str, host: &str, message: impl ToString) -> Self {
        ResolveError::Transport {
            resolver,
            host: host.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_aaaa_display() {
        let err = ResolveError::NoAaaaRecord {
            host: "ipv4only.example".to_string(),
        };
        assert_eq!(err.to_string(), "No AAAA record found for ipv4only.example");
    }

    #[test]
    fn test_transport_display() {
        let err = ResolveError::transport("DoT", "example.com", "connection reset");
        let msg = err.to_string();
        assert!(msg.starts_with("DoT lookup for example.com failed"));
        assert!(msg.contains("connection reset"));
    }
}
