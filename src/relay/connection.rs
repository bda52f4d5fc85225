//! Peer connection ownership and event loop.
//!
//! The relay owns at most one live peer connection. A new peer attaching
//! while another is connected evicts the old one ("latest wins"): the old
//! peer receives a graceful close, every request pending against it is
//! rejected with a connection-lost error, and only then is the new handle
//! installed.
//!
//! # Event Loop
//!
//! Each connection spawns a task multiplexing:
//!
//! - Inbound frames from the peer (replies, capture events, settings)
//! - Outbound commands from the relay (frames, pings, close)
//!
//! Every inbound message, regardless of content, refreshes the liveness
//! timestamp so bursts of unrelated traffic never trip the heartbeat
//! timeout.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{InboundFrame, OutboundFrame, ReplyKind};

use super::heartbeat;
use super::service::RelayCore;

// ============================================================================
// Constants
// ============================================================================

/// Close code sent to a peer evicted by a newer connection.
pub const EVICTION_CLOSE_CODE: u16 = 4000;

/// Close code sent when the liveness timeout fires.
pub const LIVENESS_CLOSE_CODE: u16 = 4001;

/// Close code sent during relay shutdown (going away).
pub const SHUTDOWN_CLOSE_CODE: u16 = 1001;

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No peer attached.
    Disconnected,
    /// A peer is attached and live.
    Connected,
    /// A close has been requested but the transport is still open.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Closing => "closing",
        };
        f.write_str(text)
    }
}

// ============================================================================
// Types
// ============================================================================

/// Commands consumed by the connection event loop.
enum SocketCommand {
    /// Send a serialized frame.
    Frame(String),
    /// Send a transport-level ping.
    Ping,
    /// Send a close frame and terminate.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: &'static str,
    },
}

/// State shared between the manager, the event loop, and the heartbeat
/// monitor for one connection.
struct ConnectionShared {
    /// Refreshed by every inbound message.
    last_liveness: Mutex<Instant>,
    /// Set once a close has been requested.
    closing: AtomicBool,
}

/// The installed peer connection handle.
struct ActiveConnection {
    id: ConnectionId,
    outbound_tx: mpsc::UnboundedSender<SocketCommand>,
    shared: Arc<ConnectionShared>,
}

impl ActiveConnection {
    /// Requests a graceful close; the event loop sends the close frame
    /// and terminates.
    fn request_close(&self, code: u16, reason: &'static str) {
        self.shared.closing.store(true, Ordering::SeqCst);
        let _ = self.outbound_tx.send(SocketCommand::Close { code, reason });
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owns the single live peer connection.
#[derive(Default)]
pub struct ConnectionManager {
    active: Mutex<Option<ActiveConnection>>,
    /// Last liveness signal observed on any connection; survives
    /// disconnects so the status endpoint can report it.
    last_seen: Mutex<Option<Instant>>,
}

impl ConnectionManager {
    /// Creates a manager with no peer attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self.active.lock().as_ref() {
            None => ConnectionState::Disconnected,
            Some(conn) if conn.shared.closing.load(Ordering::SeqCst) => ConnectionState::Closing,
            Some(_) => ConnectionState::Connected,
        }
    }

    /// Returns the identity of the current connection, if any.
    #[must_use]
    pub fn current_id(&self) -> Option<ConnectionId> {
        self.active.lock().as_ref().map(|conn| conn.id)
    }

    /// Serializes and queues a frame for the current peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when no live peer is attached.
    pub fn send(&self, frame: &OutboundFrame) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        let active = self.active.lock();
        match active.as_ref() {
            Some(conn) => conn
                .outbound_tx
                .send(SocketCommand::Frame(json))
                .map_err(|_| Error::NotConnected),
            None => Err(Error::NotConnected),
        }
    }

    /// Queues a transport-level ping for the current peer if it matches
    /// `id`.
    pub(crate) fn ping(&self, id: ConnectionId) {
        let active = self.active.lock();
        if let Some(conn) = active.as_ref() {
            if conn.id == id {
                let _ = conn.outbound_tx.send(SocketCommand::Ping);
            }
        }
    }

    /// Age of the most recent liveness signal, across connections.
    #[must_use]
    pub fn last_seen_age(&self) -> Option<Duration> {
        self.last_seen.lock().map(|at| at.elapsed())
    }

    /// Returns `true` when connection `id` is current and its liveness
    /// timestamp is older than `timeout`.
    pub(crate) fn liveness_overdue(&self, id: ConnectionId, timeout: Duration) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(conn) if conn.id == id => conn.shared.last_liveness.lock().elapsed() > timeout,
            _ => false,
        }
    }

    /// Marks the current connection as closing (shutdown sequence).
    pub(crate) fn mark_closing(&self) {
        if let Some(conn) = self.active.lock().as_ref() {
            conn.shared.closing.store(true, Ordering::SeqCst);
        }
    }

    /// Force-closes the current connection, whatever it is.
    ///
    /// Returns `true` if a connection was present.
    pub(crate) fn force_close_current(&self, code: u16, reason: &'static str) -> bool {
        let taken = self.active.lock().take();
        match taken {
            Some(conn) => {
                conn.request_close(code, reason);
                true
            }
            None => false,
        }
    }

    /// Force-closes connection `id` if it is still current.
    ///
    /// Returns `true` exactly once per connection; the gate makes
    /// failure cleanup idempotent.
    pub(crate) fn force_close_if_current(
        &self,
        id: ConnectionId,
        code: u16,
        reason: &'static str,
    ) -> bool {
        let taken = {
            let mut active = self.active.lock();
            match active.as_ref() {
                Some(conn) if conn.id == id => active.take(),
                _ => None,
            }
        };
        match taken {
            Some(conn) => {
                conn.request_close(code, reason);
                true
            }
            None => false,
        }
    }

    /// Removes connection `id` if it is still current, without sending
    /// anything (the transport is already gone).
    pub(crate) fn detach_if_current(&self, id: ConnectionId) -> bool {
        let mut active = self.active.lock();
        match active.as_ref() {
            Some(conn) if conn.id == id => {
                *active = None;
                true
            }
            _ => false,
        }
    }

    fn note_liveness(&self, shared: &ConnectionShared) {
        let now = Instant::now();
        *shared.last_liveness.lock() = now;
        *self.last_seen.lock() = Some(now);
    }

    /// Installs `conn` as the live connection, evicting the previous one
    /// atomically.
    ///
    /// The old peer's pending requests are rejected under the same lock,
    /// strictly before the new handle becomes visible to registrations.
    /// Both the close and the rejections are non-blocking channel sends,
    /// so holding the lock here is safe.
    fn replace(
        &self,
        registry: &crate::relay::registry::CorrelationRegistry,
        conn: ActiveConnection,
    ) -> Option<ConnectionId> {
        let mut active = self.active.lock();
        let evicted = active.take().map(|old| {
            old.request_close(EVICTION_CLOSE_CODE, "replaced by newer connection");
            registry.reject_all(|| Error::connection_lost("replaced by newer connection"));
            old.id
        });
        *self.last_seen.lock() = Some(Instant::now());
        *active = Some(conn);
        evicted
    }
}

// ============================================================================
// Attach
// ============================================================================

/// Accepts a freshly upgraded peer socket.
///
/// Evicts the previous peer (graceful close, reject its pending requests)
/// before installing the new handle, then spawns the event loop and the
/// heartbeat monitor for the new connection.
pub(crate) fn attach_peer(core: Arc<RelayCore>, socket: WebSocket) {
    let id = ConnectionId::generate();
    let shared = Arc::new(ConnectionShared {
        last_liveness: Mutex::new(Instant::now()),
        closing: AtomicBool::new(false),
    });
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    // Old peer out, its pending requests rejected, strictly before the
    // new handle can accept registrations.
    let evicted = core.manager.replace(
        &core.registry,
        ActiveConnection {
            id,
            outbound_tx,
            shared: Arc::clone(&shared),
        },
    );
    if let Some(old) = evicted {
        info!(old = %old, new = %id, "Evicted previous peer connection");
    }

    info!(connection = %id, "Peer attached");

    tokio::spawn(run_event_loop(Arc::clone(&core), socket, id, shared, outbound_rx));
    tokio::spawn(heartbeat::run(core, id));
}

// ============================================================================
// Event Loop
// ============================================================================

async fn run_event_loop(
    core: Arc<RelayCore>,
    socket: WebSocket,
    id: ConnectionId,
    shared: Arc<ConnectionShared>,
    mut outbound_rx: mpsc::UnboundedReceiver<SocketCommand>,
) {
    let (mut ws_write, mut ws_read) = socket.split();
    let mut loss_reason = "connection closed";

    loop {
        tokio::select! {
            // Inbound messages from the peer
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        core.manager.note_liveness(&shared);
                        handle_text(&core, id, &text);
                    }

                    Some(Ok(Message::Ping(payload))) => {
                        core.manager.note_liveness(&shared);
                        if ws_write.send(Message::Pong(payload)).await.is_err() {
                            loss_reason = "transport error";
                            break;
                        }
                    }

                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {
                        core.manager.note_liveness(&shared);
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %id, "Peer closed the connection");
                        loss_reason = "peer closed";
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(connection = %id, error = %e, "Transport error");
                        loss_reason = "transport error";
                        break;
                    }

                    None => {
                        debug!(connection = %id, "Peer stream ended");
                        loss_reason = "peer stream ended";
                        break;
                    }
                }
            }

            // Commands from the relay
            command = outbound_rx.recv() => {
                match command {
                    Some(SocketCommand::Frame(json)) => {
                        if let Err(e) = ws_write.send(Message::Text(json)).await {
                            warn!(connection = %id, error = %e, "Frame write failed");
                            loss_reason = "write failed";
                            break;
                        }
                    }

                    Some(SocketCommand::Ping) => {
                        if ws_write.send(Message::Ping(Vec::new())).await.is_err() {
                            loss_reason = "write failed";
                            break;
                        }
                    }

                    Some(SocketCommand::Close { code, reason }) => {
                        debug!(connection = %id, code, reason, "Closing connection");
                        let _ = ws_write
                            .send(Message::Close(Some(CloseFrame {
                                code,
                                reason: Cow::Borrowed(reason),
                            })))
                            .await;
                        loss_reason = reason;
                        break;
                    }

                    None => {
                        loss_reason = "relay dropped the connection";
                        break;
                    }
                }
            }
        }
    }

    // Cleanup fires at most once per connection: the detach gate loses
    // to any earlier eviction, heartbeat failure, or forced close.
    if core.manager.detach_if_current(id) {
        core.registry
            .reject_all(|| Error::connection_lost(loss_reason));
        info!(connection = %id, reason = loss_reason, "Peer detached");
    }

    debug!(connection = %id, "Event loop terminated");
}

// ============================================================================
// Inbound Dispatch
// ============================================================================

/// Parses and dispatches one inbound text frame.
///
/// A malformed frame is logged and dropped; it is never fatal to the
/// connection or the process.
fn handle_text(core: &Arc<RelayCore>, id: ConnectionId, text: &str) {
    let frame = match serde_json::from_str::<InboundFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(connection = %id, error = %e, "Dropping malformed frame");
            return;
        }
    };

    match frame {
        InboundFrame::HeartbeatResponse => {
            trace!(connection = %id, "Heartbeat response");
        }

        InboundFrame::ConsoleEvent { entry } => {
            let settings = core.settings.read().clone();
            core.logs.append_console(entry, &settings);
        }

        InboundFrame::NetworkEvent { entry } => {
            let settings = core.settings.read().clone();
            core.logs.append_network(entry, &settings);
        }

        InboundFrame::SettingsUpdate { patch } => {
            core.apply_settings(&patch);
        }

        reply => match reply.correlation() {
            Some((Some(request_id), _)) => {
                core.registry.resolve(request_id, reply);
            }

            Some((None, kind)) => {
                if kind == ReplyKind::Screenshot && core.config.legacy_screenshot_fallback {
                    core.registry.resolve_unlabeled(kind, reply);
                } else {
                    warn!(connection = %id, ?kind, "Dropping reply without request id");
                }
            }

            None => {
                debug!(connection = %id, "Uncorrelated frame ignored");
            }
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }

    #[test]
    fn test_send_without_peer_fails() {
        let manager = ConnectionManager::new();
        let err = manager.send(&OutboundFrame::Heartbeat).unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[test]
    fn test_initial_state() {
        let manager = ConnectionManager::new();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.current_id().is_none());
        assert!(manager.last_seen_age().is_none());
    }

    #[test]
    fn test_detach_unknown_connection_is_noop() {
        let manager = ConnectionManager::new();
        assert!(!manager.detach_if_current(ConnectionId::generate()));
        assert!(!manager.force_close_current(SHUTDOWN_CLOSE_CODE, "test"));
    }

    fn test_connection() -> (ActiveConnection, mpsc::UnboundedReceiver<SocketCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ActiveConnection {
            id: ConnectionId::generate(),
            outbound_tx: tx,
            shared: Arc::new(ConnectionShared {
                last_liveness: Mutex::new(Instant::now()),
                closing: AtomicBool::new(false),
            }),
        };
        (conn, rx)
    }

    #[tokio::test]
    async fn test_replace_evicts_and_rejects_pending() {
        let manager = ConnectionManager::new();
        let registry = crate::relay::registry::CorrelationRegistry::new();

        let (a, mut rx_a) = test_connection();
        let a_id = a.id;
        assert!(manager.replace(&registry, a).is_none());
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.current_id(), Some(a_id));

        // A request pending against the first connection...
        let pending = registry
            .register(crate::identifiers::RequestId::generate(), ReplyKind::Navigation)
            .expect("register");

        // ...is rejected when a newer connection replaces it.
        let (b, _rx_b) = test_connection();
        let b_id = b.id;
        assert_eq!(manager.replace(&registry, b), Some(a_id));
        assert_eq!(manager.current_id(), Some(b_id));

        let err = pending.await.expect("settled").unwrap_err();
        assert!(matches!(err, Error::ConnectionLost { .. }));

        // The evicted handle got a graceful close command.
        assert!(matches!(
            rx_a.recv().await,
            Some(SocketCommand::Close {
                code: EVICTION_CLOSE_CODE,
                ..
            })
        ));

        // The evicted connection can no longer be detached as current.
        assert!(!manager.detach_if_current(a_id));
    }

    #[tokio::test]
    async fn test_liveness_overdue_only_for_current() {
        let manager = ConnectionManager::new();
        let registry = crate::relay::registry::CorrelationRegistry::new();
        let (conn, _rx) = test_connection();
        let id = conn.id;
        manager.replace(&registry, conn);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(manager.liveness_overdue(id, Duration::from_millis(1)));
        assert!(!manager.liveness_overdue(id, Duration::from_secs(60)));
        assert!(!manager.liveness_overdue(ConnectionId::generate(), Duration::from_millis(1)));

        // force_close_if_current fires exactly once.
        assert!(manager.force_close_if_current(id, LIVENESS_CLOSE_CODE, "liveness timeout"));
        assert!(!manager.force_close_if_current(id, LIVENESS_CLOSE_CODE, "liveness timeout"));
        assert!(!manager.liveness_overdue(id, Duration::from_millis(1)));
    }
}
