//! HTTP surface of the relay.
//!
//! One listener serves three routes:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /.identity` | Signed identity probe for discovery |
//! | `GET /status` | Connection/liveness snapshot |
//! | `GET /session` | WebSocket upgrade for the browser-side agent |
//!
//! Handlers receive the relay core through router state; route wiring is
//! deliberately thin, all behavior lives in [`crate::relay`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tracing::debug;

use crate::protocol::identity::{IDENTITY_PATH, SESSION_PATH, STATUS_PATH};
use crate::protocol::{IdentityProbe, StatusReport};
use crate::relay::connection;
use crate::relay::service::RelayCore;

// ============================================================================
// Router
// ============================================================================

/// Builds the relay router.
pub(crate) fn router(core: Arc<RelayCore>) -> Router {
    Router::new()
        .route(IDENTITY_PATH, get(identity))
        .route(STATUS_PATH, get(status))
        .route(SESSION_PATH, get(session))
        .with_state(core)
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /.identity` — the signed identity probe.
async fn identity(State(core): State<Arc<RelayCore>>) -> Json<IdentityProbe> {
    Json(core.identity())
}

/// `GET /status` — connection and liveness snapshot.
async fn status(State(core): State<Arc<RelayCore>>) -> Json<StatusReport> {
    Json(core.status())
}

/// `GET /session` — upgrades the browser-side agent's connection.
async fn session(
    State(core): State<Arc<RelayCore>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    debug!("Peer requested session upgrade");
    ws.on_upgrade(move |socket| async move {
        connection::attach_peer(core, socket);
    })
}
