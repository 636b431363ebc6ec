//! Proxy access control.
//!
//! Two independent checks run before any request is mediated: HTTP Basic
//! credentials from `Proxy-Authorization`, and (optionally) that the client
//! connected over IPv4.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::net::SocketAddr;

/// Realm advertised in `Proxy-Authenticate` challenges.
pub const PROXY_REALM: &str = "Proxy";

/// Value of the `Proxy-Authenticate` header sent with 407 responses.
pub fn challenge() -> String {
    format!("Basic realm=\"{}\"", PROXY_REALM)
}

/// The single username/password pair accepted by the proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Expected username.
    pub username: String,
    /// Expected password.
    pub password: String,
}

impl Credentials {
    /// Create a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Check a `Proxy-Authorization` header value against the configured pair.
///
/// With no credentials configured every request passes. Otherwise the header
/// must be `Basic <base64(user:pass)>` where the decoded text, split at the
/// first colon, matches both fields exactly.
pub fn authorize(header: Option<&str>, configured: Option<&Credentials>) -> bool {
    let Some(expected) = configured else {
        return true;
    };

    let Some(header) = header else {
        return false;
    };

    let Some(encoded) = header.strip_prefix("Basic ") else {
        return false;
    };

    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };

    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };

    match decoded.split_once(':') {
        Some((user, pass)) => user == expected.username && pass == expected.password,
        None => false,
    }
}

/// Whether `peer` is an IPv4 client. IPv4-mapped IPv6 peers count as IPv4.
pub fn is_ipv4_client(peer: SocketAddr) -> bool {
    peer.ip().to_canonical().is_ipv4()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(raw: &str) -> String {
        format!("Basic {}", STANDARD.encode(raw))
    }

    fn creds() -> Credentials {
        Credentials::new("alice", "s3cret")
    }

    #[test]
    fn test_open_mode_accepts_anything() {
        assert!(authorize(None, None));
        assert!(authorize(Some("garbage"), None));
        assert!(authorize(Some(&basic("x:y")), None));
    }

    #[test]
    fn test_exact_match() {
        assert!(authorize(Some(&basic("alice:s3cret")), Some(&creds())));
    }

    #[test]
    fn test_password_may_contain_colons() {
        let creds = Credentials::new("alice", "a:b:c");
        assert!(authorize(Some(&basic("alice:a:b:c")), Some(&creds)));
    }

    #[test]
    fn test_rejections() {
        let creds = creds();
        let cases = [
            None,
            Some(basic("alice:wrong")),
            Some(basic("Alice:s3cret")),
            Some(basic("alice:s3cret ")),
            Some(basic("alices3cret")),
            Some(format!("Bearer {}", STANDARD.encode("alice:s3cret"))),
            Some("Basic !!!not-base64!!!".to_string()),
            Some(format!("Basic {}", STANDARD.encode([0xff, 0xfe, b':', b'x']))),
        ];

        for header in cases {
            assert!(
                !authorize(header.as_deref(), Some(&creds)),
                "header {:?} should be rejected",
                header
            );
        }
    }

    #[test]
    fn test_client_family() {
        assert!(is_ipv4_client("192.0.2.10:5555".parse().unwrap()));
        assert!(is_ipv4_client("[::ffff:192.0.2.10]:5555".parse().unwrap()));
        assert!(!is_ipv4_client("[2001:db8::10]:5555".parse().unwrap()));
    }

    #[test]
    fn test_challenge_header() {
        assert_eq!(challenge(), "Basic realm=\"Proxy\"");
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", creds());
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("s3cret"));
    }
}
