//! Identity probe and status payloads.
//!
//! The identity probe is how a caller tells "our relay" apart from some
//! other service that happens to be listening on a candidate port: the
//! response must carry [`IDENTITY_SIGNATURE`] verbatim. A mismatched or
//! absent signature means "not our peer", not merely "unreachable".

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Shared signature constant the relay and its callers must agree on.
pub const IDENTITY_SIGNATURE: &str = "browser-relay/identity/v1";

/// Fixed HTTP path of the identity probe.
pub const IDENTITY_PATH: &str = "/.identity";

/// Fixed HTTP path of the status endpoint.
pub const STATUS_PATH: &str = "/status";

/// Fixed HTTP path of the peer WebSocket endpoint.
pub const SESSION_PATH: &str = "/session";

// ============================================================================
// IdentityProbe
// ============================================================================

/// Body of the identity probe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProbe {
    /// Port the relay is listening on.
    pub port: u16,

    /// Service name.
    pub name: String,

    /// Service version.
    pub version: String,

    /// Shared signature; compared against [`IDENTITY_SIGNATURE`].
    pub signature: String,
}

impl IdentityProbe {
    /// Creates the probe body this relay serves.
    #[must_use]
    pub fn local(port: u16) -> Self {
        Self {
            port,
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            signature: IDENTITY_SIGNATURE.to_string(),
        }
    }

    /// Returns `true` if the signature matches the shared constant.
    #[inline]
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signature == IDENTITY_SIGNATURE
    }
}

// ============================================================================
// ServerIdentity
// ============================================================================

/// A resolved relay location, cached by the discovery client.
///
/// `host` is the candidate that answered the probe; the remaining fields
/// come from the probe body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    /// Host the probe succeeded against.
    pub host: String,

    /// Port the relay is listening on.
    pub port: u16,

    /// Service name.
    pub name: String,

    /// Service version.
    pub version: String,

    /// Signature carried by the probe response.
    pub signature: String,
}

impl ServerIdentity {
    /// Combines a probed candidate host with the probe body.
    #[must_use]
    pub fn from_probe(host: impl Into<String>, probe: IdentityProbe) -> Self {
        Self {
            host: host.into(),
            port: probe.port,
            name: probe.name,
            version: probe.version,
            signature: probe.signature,
        }
    }

    /// Returns the HTTP base URL of this relay.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Returns the WebSocket URL of the peer endpoint.
    #[must_use]
    pub fn session_url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, SESSION_PATH)
    }
}

// ============================================================================
// StatusReport
// ============================================================================

/// Body of the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// `true` while a peer is attached.
    pub connected: bool,

    /// Human-readable connection state.
    pub state_text: String,

    /// Milliseconds since the last liveness signal; absent when no peer
    /// has ever attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_ago_ms: Option<u64>,

    /// Number of in-flight correlated requests.
    pub pending_request_count: usize,

    /// Seconds since the relay started.
    pub uptime_seconds: u64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_probe_signed() {
        let probe = IdentityProbe::local(8860);
        assert!(probe.is_signed());
        assert_eq!(probe.port, 8860);
        assert_eq!(probe.name, env!("CARGO_PKG_NAME"));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let probe = IdentityProbe {
            port: 8860,
            name: "something-else".to_string(),
            version: "9.9.9".to_string(),
            signature: "not/our/signature".to_string(),
        };
        assert!(!probe.is_signed());
    }

    #[test]
    fn test_identity_urls() {
        let identity = ServerIdentity::from_probe("127.0.0.1", IdentityProbe::local(9000));
        assert_eq!(identity.base_url(), "http://127.0.0.1:9000");
        assert_eq!(identity.session_url(), "ws://127.0.0.1:9000/session");
    }

    #[test]
    fn test_status_report_field_names() {
        let report = StatusReport {
            connected: true,
            state_text: "connected".to_string(),
            last_heartbeat_ago_ms: Some(120),
            pending_request_count: 2,
            uptime_seconds: 33,
        };

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["stateText"], "connected");
        assert_eq!(json["lastHeartbeatAgoMs"], 120);
        assert_eq!(json["pendingRequestCount"], 2);
        assert_eq!(json["uptimeSeconds"], 33);
    }
}
