//! Relay and discovery configuration.
//!
//! Provides type-safe configuration for the relay service and the
//! discovery client, with builder-style `with_*` methods.
//!
//! # Example
//!
//! ```ignore
//! use browser_relay::RelayConfig;
//! use std::time::Duration;
//!
//! let config = RelayConfig::new()
//!     .with_port(0)
//!     .with_heartbeat_interval(Duration::from_secs(10))
//!     .with_liveness_timeout(Duration::from_secs(30));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::retry::RetryPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Default port the relay binds and discovery probes first.
pub const DEFAULT_PORT: u16 = 8860;

/// Number of consecutive ports covered by the discovery fallback range.
pub const FALLBACK_PORT_SPAN: u16 = 3;

/// Default probe interval T1.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Default liveness timeout T2. Must exceed T1 with enough margin to
/// tolerate one missed probe.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Default budget for a correlated peer round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period between notifying the peer of shutdown and force-closing
/// the transport.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Per-candidate identity probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// RelayConfig
// ============================================================================

/// Configuration for [`RelayService`](crate::RelayService).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// IP address the HTTP/WebSocket listener binds to.
    pub bind_ip: IpAddr,

    /// Port to bind (0 for an OS-assigned port).
    pub port: u16,

    /// Heartbeat probe interval (T1).
    pub heartbeat_interval: Duration,

    /// Liveness timeout (T2); no inbound traffic for longer than this
    /// declares the connection dead.
    pub liveness_timeout: Duration,

    /// Default budget for correlated operations.
    pub request_timeout: Duration,

    /// Grace period during the shutdown sequence.
    pub shutdown_grace: Duration,

    /// Resolve a screenshot reply that lacks a `requestId` against the
    /// oldest pending screenshot request instead of discarding it.
    ///
    /// Compatibility mode for older peer builds; strict id-matching
    /// applies when disabled.
    pub legacy_screenshot_fallback: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            legacy_screenshot_fallback: true,
        }
    }

    /// Sets the bind IP address.
    #[inline]
    #[must_use]
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Sets the bind port (0 for an OS-assigned port).
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the heartbeat probe interval (T1).
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the liveness timeout (T2).
    #[inline]
    #[must_use]
    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    /// Sets the default correlated-operation budget.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the shutdown grace period.
    #[inline]
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Enables or disables the legacy unlabeled-screenshot fallback.
    #[inline]
    #[must_use]
    pub fn with_legacy_screenshot_fallback(mut self, enabled: bool) -> Self {
        self.legacy_screenshot_fallback = enabled;
        self
    }
}

// ============================================================================
// DiscoveryConfig
// ============================================================================

/// Configuration for [`DiscoveryClient`](crate::DiscoveryClient).
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Explicitly configured relay location, probed first when present.
    pub explicit: Option<(String, u16)>,

    /// Loopback aliases probed at [`DiscoveryConfig::base_port`].
    pub loopback_aliases: Vec<String>,

    /// First port of the probe range.
    pub base_port: u16,

    /// Number of consecutive ports probed beyond `base_port` on the
    /// first loopback alias.
    pub fallback_span: u16,

    /// Per-candidate probe timeout.
    pub probe_timeout: Duration,

    /// Bounded retry policy for wrapped relay calls.
    pub retry: RetryPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            explicit: None,
            loopback_aliases: vec![
                "127.0.0.1".to_string(),
                "localhost".to_string(),
                "[::1]".to_string(),
            ],
            base_port: DEFAULT_PORT,
            fallback_span: FALLBACK_PORT_SPAN,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets an explicit host and port to probe first.
    #[inline]
    #[must_use]
    pub fn with_explicit(mut self, host: impl Into<String>, port: u16) -> Self {
        self.explicit = Some((host.into(), port));
        self
    }

    /// Sets the first port of the probe range.
    #[inline]
    #[must_use]
    pub fn with_base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    /// Sets the number of fallback ports probed beyond the base port.
    #[inline]
    #[must_use]
    pub fn with_fallback_span(mut self, span: u16) -> Self {
        self.fallback_span = span;
        self
    }

    /// Sets the per-candidate probe timeout.
    #[inline]
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the retry policy for wrapped calls.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_defaults() {
        let config = RelayConfig::new();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.liveness_timeout > config.heartbeat_interval);
        assert!(config.legacy_screenshot_fallback);
    }

    #[test]
    fn test_relay_builder() {
        let config = RelayConfig::new()
            .with_port(0)
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_liveness_timeout(Duration::from_secs(12))
            .with_legacy_screenshot_fallback(false);

        assert_eq!(config.port, 0);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.liveness_timeout, Duration::from_secs(12));
        assert!(!config.legacy_screenshot_fallback);
    }

    #[test]
    fn test_discovery_defaults() {
        let config = DiscoveryConfig::new();
        assert!(config.explicit.is_none());
        assert_eq!(config.base_port, DEFAULT_PORT);
        assert_eq!(config.loopback_aliases.len(), 3);
    }

    #[test]
    fn test_discovery_builder() {
        let config = DiscoveryConfig::new()
            .with_explicit("10.0.0.5", 9000)
            .with_probe_timeout(Duration::from_millis(250));

        assert_eq!(config.explicit, Some(("10.0.0.5".to_string(), 9000)));
        assert_eq!(config.probe_timeout, Duration::from_millis(250));
    }
}
