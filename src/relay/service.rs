//! The relay service.
//!
//! [`RelayService`] is the owned service object with an explicit
//! constructor/shutdown lifecycle: it binds the HTTP/WebSocket listener,
//! owns the connection manager, correlation registry, log store and
//! settings, and exposes the caller-facing operations. Handlers receive
//! it by reference through router state; nothing lives in module-level
//! globals.
//!
//! # Example
//!
//! ```ignore
//! use browser_relay::{RelayConfig, RelayService, ScreenshotFormat};
//!
//! let relay = RelayService::bind(RelayConfig::new().with_port(0)).await?;
//! println!("listening on {}", relay.local_addr());
//!
//! // ... browser-side agent connects to /session ...
//!
//! let shot = relay.capture_screenshot(ScreenshotFormat::Png).await?;
//! println!("{} base64 bytes", shot.data.len());
//!
//! relay.shutdown().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as Base64Standard;
use base64::Engine;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::logs::{LogQueryResult, LogStore};
use crate::protocol::{IdentityProbe, InboundFrame, OutboundFrame, ReplyKind, StatusReport};
use crate::settings::{Settings, SettingsPatch};

use super::connection::{ConnectionManager, ConnectionState, SHUTDOWN_CLOSE_CODE};
use super::registry::CorrelationRegistry;

// ============================================================================
// RelayCore
// ============================================================================

/// State shared between the service, the HTTP handlers, and the
/// per-connection tasks.
pub(crate) struct RelayCore {
    pub(crate) config: RelayConfig,
    pub(crate) port: u16,
    pub(crate) manager: ConnectionManager,
    pub(crate) registry: CorrelationRegistry,
    pub(crate) logs: LogStore,
    pub(crate) settings: RwLock<Settings>,
    pub(crate) started_at: Instant,
}

impl RelayCore {
    fn new(config: RelayConfig, port: u16) -> Self {
        Self {
            config,
            port,
            manager: ConnectionManager::new(),
            registry: CorrelationRegistry::new(),
            logs: LogStore::new(),
            settings: RwLock::new(Settings::default()),
            started_at: Instant::now(),
        }
    }

    /// Applies a settings patch and re-enforces buffer capacities.
    pub(crate) fn apply_settings(&self, patch: &SettingsPatch) {
        let snapshot = {
            let mut settings = self.settings.write();
            settings.apply(patch);
            settings.clone()
        };
        self.logs.enforce_capacities(&snapshot);
        info!(?patch, "Settings updated");
    }

    /// Builds the identity probe body.
    pub(crate) fn identity(&self) -> IdentityProbe {
        IdentityProbe::local(self.port)
    }

    /// Builds the status report.
    pub(crate) fn status(&self) -> StatusReport {
        let state = self.manager.state();
        StatusReport {
            connected: state == ConnectionState::Connected,
            state_text: state.to_string(),
            last_heartbeat_ago_ms: self
                .manager
                .last_seen_age()
                .map(|age| age.as_millis() as u64),
            pending_request_count: self.registry.len(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

// ============================================================================
// Operation Types
// ============================================================================

/// Image format for screenshot capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenshotFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format with quality (0-100).
    Jpeg(u8),
}

impl ScreenshotFormat {
    /// Creates JPEG format with quality (0-100).
    #[inline]
    #[must_use]
    pub fn jpeg(quality: u8) -> Self {
        Self::Jpeg(quality.min(100))
    }

    /// Returns the format string for the wire frame.
    #[must_use]
    pub fn format_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg(_) => "jpeg",
        }
    }

    /// Returns the quality value if JPEG.
    #[must_use]
    pub fn quality(&self) -> Option<u8> {
        match self {
            Self::Png => None,
            Self::Jpeg(q) => Some(*q),
        }
    }
}

/// A captured screenshot as returned by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    /// Base64-encoded image data.
    pub data: String,

    /// Format reported by the peer, when present.
    pub format: Option<String>,
}

impl Screenshot {
    /// Decodes the base64 payload into raw image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the payload is not valid base64.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        Base64Standard
            .decode(&self.data)
            .map_err(|e| Error::protocol(format!("invalid base64 in screenshot data: {e}")))
    }
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    /// URL the tab ended up at, when the peer reports it.
    pub url: Option<String>,
}

/// A DOM action forwarded verbatim to the peer.
///
/// Selector semantics are the peer's business; the relay only correlates
/// the request with its reply.
#[derive(Debug, Clone, PartialEq)]
pub struct DomAction {
    /// Action name ("click", "type", ...).
    pub action: String,

    /// Target selector, when the action needs one.
    pub selector: Option<String>,

    /// Action payload (text to type, coordinates, ...).
    pub value: Option<Value>,
}

impl DomAction {
    /// Creates an action with no selector or payload.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            selector: None,
            value: None,
        }
    }

    /// Sets the target selector.
    #[inline]
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Sets the action payload.
    #[inline]
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

// ============================================================================
// RelayService
// ============================================================================

/// The relay service handle.
///
/// Construct with [`RelayService::bind`]; tear down with
/// [`RelayService::shutdown`].
pub struct RelayService {
    core: Arc<RelayCore>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    server_task: Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// RelayService - Lifecycle
// ============================================================================

impl RelayService {
    /// Binds the listener and starts serving the identity, status, and
    /// peer-session routes.
    ///
    /// Use port 0 to let the OS assign a port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        let addr = SocketAddr::new(config.bind_ip, config.port);
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let core = Arc::new(RelayCore::new(config, local_addr.port()));
        let router = crate::server::router(Arc::clone(&core));

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server_task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "Relay listener failed");
            }
        });

        info!(port = local_addr.port(), "Relay listening");

        Ok(Self {
            core,
            local_addr,
            shutdown_tx,
            server_task: Mutex::new(Some(server_task)),
        })
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.core.manager.state()
    }

    /// Returns the number of in-flight correlated requests.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.core.registry.len()
    }

    /// Returns the identity probe body this relay serves.
    #[must_use]
    pub fn identity(&self) -> IdentityProbe {
        self.core.identity()
    }

    /// Returns the current status report.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        self.core.status()
    }

    /// Shuts the relay down.
    ///
    /// Sequence: notify the peer (`server-shutdown`) → grace wait for a
    /// clean close → force-terminate the transport if still open →
    /// reject all outstanding requests → stop the listener.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature leaves room for teardown
    /// failures to surface.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Relay shutting down");

        if self.core.manager.current_id().is_some() {
            let _ = self.core.manager.send(&OutboundFrame::ServerShutdown);
            self.core.manager.mark_closing();

            let deadline = Instant::now() + self.core.config.shutdown_grace;
            while self.core.manager.current_id().is_some() && Instant::now() < deadline {
                sleep(Duration::from_millis(20)).await;
            }

            if self
                .core
                .manager
                .force_close_current(SHUTDOWN_CLOSE_CODE, "server shutting down")
            {
                debug!("Peer transport force-closed");
            }
        }

        self.core
            .registry
            .reject_all(|| Error::connection_lost("relay shut down"));

        let _ = self.shutdown_tx.send(true);
        let task = self.server_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        info!("Relay shutdown complete");
        Ok(())
    }
}

// ============================================================================
// RelayService - Settings & Logs
// ============================================================================

impl RelayService {
    /// Returns a snapshot of the current settings.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.core.settings.read().clone()
    }

    /// Applies a caller-side settings patch.
    pub fn update_settings(&self, patch: &SettingsPatch) {
        self.core.apply_settings(patch);
    }

    /// Queries captured console entries under the current settings.
    #[must_use]
    pub fn console_logs(&self) -> LogQueryResult {
        let settings = self.settings();
        self.core.logs.query_console(&settings)
    }

    /// Queries captured network entries under the current settings.
    #[must_use]
    pub fn network_logs(&self) -> LogQueryResult {
        let settings = self.settings();
        self.core.logs.query_network(&settings)
    }
}

// ============================================================================
// RelayService - Operations
// ============================================================================

impl RelayService {
    /// Captures the visible tab with the default budget.
    pub async fn capture_screenshot(&self, format: ScreenshotFormat) -> Result<Screenshot> {
        self.capture_screenshot_with_timeout(format, self.core.config.request_timeout)
            .await
    }

    /// Captures the visible tab with a custom budget.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no peer is attached
    /// - [`Error::Timeout`] if no reply arrives within the budget
    /// - [`Error::Peer`] if the peer reports a capture failure
    pub async fn capture_screenshot_with_timeout(
        &self,
        format: ScreenshotFormat,
        budget: Duration,
    ) -> Result<Screenshot> {
        let request_id = RequestId::generate();
        debug!(request_id = %request_id, format = ?format, "Capturing screenshot");

        let frame = OutboundFrame::TakeScreenshot {
            request_id,
            format: Some(format.format_str().to_string()),
            quality: format.quality(),
        };

        match self.round_trip(frame, ReplyKind::Screenshot, budget).await? {
            InboundFrame::ScreenshotData { data, format, .. } => Ok(Screenshot { data, format }),
            InboundFrame::ScreenshotError { error, .. } => Err(Error::peer(error)),
            _ => Err(Error::protocol("unexpected reply to screenshot request")),
        }
    }

    /// Navigates the active tab with the default budget.
    pub async fn navigate_tab(&self, url: &str) -> Result<NavigationOutcome> {
        self.navigate_tab_with_timeout(url, self.core.config.request_timeout)
            .await
    }

    /// Navigates the active tab with a custom budget.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no peer is attached
    /// - [`Error::Timeout`] if no reply arrives within the budget
    /// - [`Error::Peer`] if the peer reports a navigation failure
    pub async fn navigate_tab_with_timeout(
        &self,
        url: &str,
        budget: Duration,
    ) -> Result<NavigationOutcome> {
        let request_id = RequestId::generate();
        debug!(request_id = %request_id, url = %url, "Navigating tab");

        let frame = OutboundFrame::NavigateTab {
            request_id,
            url: url.to_string(),
        };

        match self.round_trip(frame, ReplyKind::Navigation, budget).await? {
            InboundFrame::NavigationResponse {
                error: Some(error), ..
            } => Err(Error::peer(error)),
            InboundFrame::NavigationResponse { url, .. } => Ok(NavigationOutcome { url }),
            _ => Err(Error::protocol("unexpected reply to navigation request")),
        }
    }

    /// Performs a DOM action with the default budget.
    pub async fn dom_action(&self, action: DomAction) -> Result<Value> {
        self.dom_action_with_timeout(action, self.core.config.request_timeout)
            .await
    }

    /// Performs a DOM action with a custom budget.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no peer is attached
    /// - [`Error::Timeout`] if no reply arrives within the budget
    /// - [`Error::Peer`] if the peer reports an action failure
    pub async fn dom_action_with_timeout(
        &self,
        action: DomAction,
        budget: Duration,
    ) -> Result<Value> {
        let request_id = RequestId::generate();
        debug!(request_id = %request_id, action = %action.action, "Performing DOM action");

        let frame = OutboundFrame::DomAction {
            request_id,
            action: action.action,
            selector: action.selector,
            value: action.value,
        };

        match self.round_trip(frame, ReplyKind::DomAction, budget).await? {
            InboundFrame::DomActionResponse {
                error: Some(error), ..
            } => Err(Error::peer(error)),
            InboundFrame::DomActionResponse { result, .. } => Ok(result),
            _ => Err(Error::protocol("unexpected reply to DOM action request")),
        }
    }

    /// Retrieves an authentication token with the default budget.
    pub async fn retrieve_auth_token(&self, service: Option<&str>) -> Result<String> {
        self.retrieve_auth_token_with_timeout(service, self.core.config.request_timeout)
            .await
    }

    /// Retrieves an authentication token with a custom budget.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no peer is attached
    /// - [`Error::Timeout`] if no reply arrives within the budget
    /// - [`Error::Peer`] if the peer reports a retrieval failure
    pub async fn retrieve_auth_token_with_timeout(
        &self,
        service: Option<&str>,
        budget: Duration,
    ) -> Result<String> {
        let request_id = RequestId::generate();
        debug!(request_id = %request_id, "Retrieving auth token");

        let frame = OutboundFrame::RetrieveAuthToken {
            request_id,
            service: service.map(str::to_string),
        };

        match self.round_trip(frame, ReplyKind::AuthToken, budget).await? {
            InboundFrame::RetrieveAuthTokenResponse {
                error: Some(error), ..
            } => Err(Error::peer(error)),
            InboundFrame::RetrieveAuthTokenResponse { token, .. } => {
                token.ok_or_else(|| Error::protocol("auth token response without token"))
            }
            _ => Err(Error::protocol("unexpected reply to auth token request")),
        }
    }

    /// Registers, sends, and awaits one correlated round trip.
    ///
    /// The entry is removed by exactly one of {reply, timeout,
    /// connection loss}; when the timeout and a reply race, whichever
    /// removed the entry first wins.
    async fn round_trip(
        &self,
        frame: OutboundFrame,
        kind: ReplyKind,
        budget: Duration,
    ) -> Result<InboundFrame> {
        let request_id = frame
            .request_id()
            .ok_or_else(|| Error::protocol("correlated frame without request id"))?;

        let mut rx = self.core.registry.register(request_id, kind)?;

        if let Err(e) = self.core.manager.send(&frame) {
            self.core.registry.remove(request_id);
            return Err(e);
        }

        match tokio::time::timeout(budget, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::connection_lost("pending request dropped")),
            Err(_) => {
                if self.core.registry.remove(request_id) {
                    Err(Error::timeout(request_id, budget.as_millis() as u64))
                } else {
                    // The reply raced the deadline and already settled
                    // the entry; take its value instead of timing out.
                    match rx.try_recv() {
                        Ok(result) => result,
                        Err(_) => Err(Error::connection_lost("request settled without a value")),
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_service() -> RelayService {
        RelayService::bind(RelayConfig::new().with_port(0))
            .await
            .expect("bind")
    }

    #[tokio::test]
    async fn test_bind_assigns_port() {
        let relay = test_service().await;
        assert!(relay.port() > 0);
        assert_eq!(relay.connection_state(), ConnectionState::Disconnected);
        relay.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_operation_without_peer_fails_fast() {
        let relay = test_service().await;

        let err = relay
            .capture_screenshot(ScreenshotFormat::Png)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        // The failed send must not leak a pending entry.
        assert_eq!(relay.pending_requests(), 0);

        relay.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_status_report_disconnected() {
        let relay = test_service().await;
        let status = relay.status();

        assert!(!status.connected);
        assert_eq!(status.state_text, "disconnected");
        assert!(status.last_heartbeat_ago_ms.is_none());
        assert_eq!(status.pending_request_count, 0);

        relay.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_settings_update_via_service() {
        let relay = test_service().await;

        let patch = SettingsPatch {
            console_capacity: Some(7),
            ..Default::default()
        };
        relay.update_settings(&patch);
        assert_eq!(relay.settings().console_capacity, 7);

        relay.shutdown().await.expect("shutdown");
    }

    #[test]
    fn test_screenshot_format() {
        assert_eq!(ScreenshotFormat::Png.format_str(), "png");
        assert_eq!(ScreenshotFormat::jpeg(120), ScreenshotFormat::Jpeg(100));
        assert_eq!(ScreenshotFormat::jpeg(80).quality(), Some(80));
        assert_eq!(ScreenshotFormat::Png.quality(), None);
    }

    #[test]
    fn test_screenshot_bytes_decode() {
        let shot = Screenshot {
            data: "aGVsbG8=".to_string(),
            format: None,
        };
        assert_eq!(shot.bytes().expect("decode"), b"hello");

        let bad = Screenshot {
            data: "!!!".to_string(),
            format: None,
        };
        assert!(bad.bytes().is_err());
    }

    #[test]
    fn test_dom_action_builder() {
        let action = DomAction::new("click")
            .with_selector("#submit")
            .with_value(serde_json::json!({ "button": "left" }));

        assert_eq!(action.action, "click");
        assert_eq!(action.selector.as_deref(), Some("#submit"));
        assert!(action.value.is_some());
    }
}
