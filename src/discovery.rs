//! Discovery client.
//!
//! Runs in the calling process. Probes an ordered candidate list for the
//! relay's signed identity, caches the winner, and wraps relay calls in
//! a bounded invalidate-rediscover-retry sequence. Retries never loop:
//! one rediscovery per failed call, then the error surfaces.
//!
//! # Candidate Order
//!
//! 1. Explicitly configured host and port, when present
//! 2. Loopback aliases (`127.0.0.1`, `localhost`, `[::1]`) at the base port
//! 3. A small fixed fallback port range on the first loopback alias
//!
//! A candidate that answers with the wrong signature is "not our peer"
//! and is skipped, exactly like an unreachable one.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::protocol::identity::{IDENTITY_PATH, STATUS_PATH};
use crate::protocol::{IdentityProbe, ServerIdentity, StatusReport};

// ============================================================================
// DiscoveryClient
// ============================================================================

/// Locates the relay and wraps calls against it.
pub struct DiscoveryClient {
    config: DiscoveryConfig,
    http: reqwest::Client,
    cached: Mutex<Option<ServerIdentity>>,
}

impl DiscoveryClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()?;

        Ok(Self {
            config,
            http,
            cached: Mutex::new(None),
        })
    }

    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(DiscoveryConfig::new())
    }

    /// Returns the cached identity, if any.
    #[must_use]
    pub fn cached(&self) -> Option<ServerIdentity> {
        self.cached.lock().clone()
    }

    /// Drops the cached identity; the next call rediscovers.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    /// Resolves the relay's identity, probing candidates when no cached
    /// address exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] when no candidate answers with a
    /// valid signature.
    pub async fn resolve(&self) -> Result<ServerIdentity> {
        if let Some(identity) = self.cached() {
            return Ok(identity);
        }

        let identity = self.sweep().await?;
        *self.cached.lock() = Some(identity.clone());
        Ok(identity)
    }

    /// Wraps a relay call with the bounded rediscovery-and-retry policy.
    ///
    /// Ensures a cached identity, runs `op`; on failure invalidates the
    /// cache, rediscovers once, retries `op` once, and surfaces the
    /// second failure.
    ///
    /// # Errors
    ///
    /// The error of the final attempt, or [`Error::Discovery`] when
    /// rediscovery finds no relay.
    pub async fn wrap<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(ServerIdentity) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let identity = self.resolve().await?;
        match op(identity).await {
            Ok(value) => Ok(value),
            Err(first) => {
                warn!(error = %first, "Relay call failed; rediscovering once");
                self.invalidate();

                let delay = self.config.retry.delay_before(2);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let identity = self.resolve().await?;
                op(identity).await
            }
        }
    }

    /// Fetches the relay's status through [`DiscoveryClient::wrap`].
    ///
    /// # Errors
    ///
    /// Surfaces discovery or transport failures after one retry.
    pub async fn status(&self) -> Result<StatusReport> {
        self.wrap(|identity| {
            let http = self.http.clone();
            async move {
                let url = format!("{}{}", identity.base_url(), STATUS_PATH);
                let report = http
                    .get(&url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<StatusReport>()
                    .await?;
                Ok(report)
            }
        })
        .await
    }

    /// Probes every candidate in order and returns the first signed
    /// identity.
    async fn sweep(&self) -> Result<ServerIdentity> {
        let candidates = self.candidates();
        debug!(count = candidates.len(), "Probing relay candidates");

        for (host, port) in &candidates {
            match self.probe(host, *port).await {
                Ok(identity) => {
                    info!(host = %identity.host, port = identity.port, "Relay discovered");
                    return Ok(identity);
                }
                Err(e) => {
                    debug!(host = %host, port, error = %e, "Candidate rejected");
                }
            }
        }

        Err(Error::discovery(format!(
            "no relay identity among {} candidates",
            candidates.len()
        )))
    }

    /// Probes one candidate.
    async fn probe(&self, host: &str, port: u16) -> Result<ServerIdentity> {
        let url = url::Url::parse(&format!("http://{host}:{port}{IDENTITY_PATH}"))
            .map_err(|e| Error::discovery(format!("invalid candidate {host}:{port}: {e}")))?;
        let probe = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<IdentityProbe>()
            .await?;

        if !probe.is_signed() {
            return Err(Error::discovery(format!(
                "identity from {host}:{port} carries a foreign signature"
            )));
        }

        Ok(ServerIdentity::from_probe(host, probe))
    }

    /// Builds the ordered, deduplicated candidate list.
    fn candidates(&self) -> Vec<(String, u16)> {
        let mut candidates: Vec<(String, u16)> = Vec::new();
        let mut push = |host: &str, port: u16, list: &mut Vec<(String, u16)>| {
            let candidate = (host.to_string(), port);
            if !list.contains(&candidate) {
                list.push(candidate);
            }
        };

        if let Some((host, port)) = &self.config.explicit {
            push(host, *port, &mut candidates);
        }

        for alias in &self.config.loopback_aliases {
            push(alias, self.config.base_port, &mut candidates);
        }

        if let Some(first) = self.config.loopback_aliases.first() {
            for offset in 1..=self.config.fallback_span {
                push(first, self.config.base_port.wrapping_add(offset), &mut candidates);
            }
        }

        candidates
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    fn client(config: DiscoveryConfig) -> DiscoveryClient {
        DiscoveryClient::new(config).expect("client")
    }

    #[test]
    fn test_candidate_order_with_explicit() {
        let client = client(
            DiscoveryConfig::new()
                .with_explicit("10.1.2.3", 9100)
                .with_base_port(9000)
                .with_fallback_span(2),
        );

        let candidates = client.candidates();
        assert_eq!(candidates[0], ("10.1.2.3".to_string(), 9100));
        assert_eq!(candidates[1], ("127.0.0.1".to_string(), 9000));
        assert_eq!(candidates[2], ("localhost".to_string(), 9000));
        assert_eq!(candidates[3], ("[::1]".to_string(), 9000));
        assert_eq!(candidates[4], ("127.0.0.1".to_string(), 9001));
        assert_eq!(candidates[5], ("127.0.0.1".to_string(), 9002));
    }

    #[test]
    fn test_candidates_deduplicated() {
        let client = client(
            DiscoveryConfig::new()
                .with_explicit("127.0.0.1", 9000)
                .with_base_port(9000)
                .with_fallback_span(1),
        );

        let candidates = client.candidates();
        let explicit_count = candidates
            .iter()
            .filter(|c| **c == ("127.0.0.1".to_string(), 9000))
            .count();
        assert_eq!(explicit_count, 1);
    }

    #[tokio::test]
    async fn test_resolve_fails_with_no_listeners() {
        // Restrict the sweep to one reserved TEST-NET-1 candidate so the
        // probe fails fast with no relay anywhere.
        let mut config = DiscoveryConfig::new()
            .with_explicit("192.0.2.1", 9)
            .with_probe_timeout(Duration::from_millis(100));
        config.loopback_aliases.clear();
        config.fallback_span = 0;
        let client = client(config);

        let err = client.resolve().await.unwrap_err();
        assert!(matches!(err, Error::Discovery { .. }));
        assert!(client.cached().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_clears_cache() {
        let client = client(DiscoveryConfig::new());
        *client.cached.lock() = Some(ServerIdentity::from_probe(
            "127.0.0.1",
            IdentityProbe::local(9000),
        ));

        assert!(client.cached().is_some());
        client.invalidate();
        assert!(client.cached().is_none());
    }

    #[tokio::test]
    async fn test_resolve_uses_cache_without_probing() {
        // No listener anywhere, but a cached identity short-circuits.
        let client = client(
            DiscoveryConfig::new().with_probe_timeout(Duration::from_millis(50)),
        );
        let identity = ServerIdentity::from_probe("127.0.0.1", IdentityProbe::local(9000));
        *client.cached.lock() = Some(identity.clone());

        let resolved = client.resolve().await.expect("cached resolve");
        assert_eq!(resolved, identity);
    }
}
